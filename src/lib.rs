//! # Mapkeeper - Dynamic Map Refresh Engine
//!
//! `mapkeeper` keeps consumer-facing lookup structures ("maps") in sync with
//! their data sources. A map is declared by a single line naming a local
//! file or an `http://` URL, optionally requiring a detached ed25519
//! signature:
//!
//! - **File maps** are re-read whenever their modification time moves
//! - **HTTP maps** use conditional requests over one keep-alive connection
//! - **Signed maps** (`sign+...`) are only published after verification
//!   against an inline key or a trusted discovered key
//! - **Lists** are parsed by resumable state machines into radix trees,
//!   host sets or key/value tables
//!
//! A bounded LRU/TTL cache ([`LruHash`]) is provided for consumers that
//! memoize lookups against published maps.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mapkeeper::{EngineConfig, EngineContext, HostList, MapRegistry, Result};
//!
//! # async fn run() -> Result<()> {
//! let engine = EngineContext::new(EngineConfig::default())?;
//! let mut registry = MapRegistry::new(engine);
//!
//! // Register a map and keep its slot
//! let hosts = registry.add("/etc/filter/hosts.map", Some("blocked hosts"), HostList)?;
//!
//! // Read existing files and start refreshing
//! registry.watch()?;
//!
//! if let Some(set) = hosts.load() {
//!     println!("blocked: {}", set.contains("example.com"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod io;
pub mod list;
pub mod map;
pub mod poller;
pub mod registry;
pub mod scheduler;
pub mod signature;

pub use cache::{LruHash, LruStats};
pub use config::EngineConfig;
pub use error::{MapError, Result};
pub use http::{fetch_http, FetchOutcome, Resolver, StaticResolver, SystemResolver};
pub use list::{
    HostList, HostSet, KvList, KvTable, MapReader, ParseState, RadixList, RadixTree, HASH_FILL,
};
pub use map::{is_map, Backend, Map, MapLine, MapPool, MapSlot};
pub use poller::{poll_file, PollOutcome};
pub use registry::{EngineContext, MapRegistry};
pub use signature::{PublicKey, SignatureVerifier};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
