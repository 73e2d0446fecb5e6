//! Map entities
//!
//! A [`Map`] is the persistent description of one data source: where it
//! lives, how it is trusted, when it was last seen fresh, and the consumer
//! binding that turns its bytes into a published structure.

pub mod line;
pub mod lock;

pub use line::{is_map, Location, MapLine};
pub use lock::{RefreshGuard, RefreshLock};

use crate::list::{MapReader, ParseState};
use crate::signature::{encoding, PublicKey};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

/// Length of the per-map log tag
const TAG_LEN: usize = 6;

/// Per-map allocation scope
///
/// Lives exactly as long as its map. Parsed generations are owned values,
/// so the pool only carries the identity attached to every log line of the
/// map (a short base-32 digest of the URI).
#[derive(Debug, Clone)]
pub struct MapPool {
    tag: String,
}

impl MapPool {
    pub fn new(uri: &str) -> Self {
        let digest = Sha256::digest(uri.as_bytes());
        let mut tag = encoding::encode(&digest);
        tag.truncate(TAG_LEN);
        MapPool { tag }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

#[derive(Debug)]
struct Published<T> {
    data: Option<Arc<T>>,
    generation: u64,
}

/// Consumer-visible slot holding the live generation of a map
///
/// Clones refer to the same slot. Readers take an `Arc` snapshot; a
/// snapshot outliving the next publish keeps its generation alive but is no
/// longer the map's data.
#[derive(Debug)]
pub struct MapSlot<T> {
    inner: Arc<RwLock<Published<T>>>,
}

impl<T> Clone for MapSlot<T> {
    fn clone(&self) -> Self {
        MapSlot {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for MapSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MapSlot<T> {
    pub fn new() -> Self {
        MapSlot {
            inner: Arc::new(RwLock::new(Published {
                data: None,
                generation: 0,
            })),
        }
    }

    /// Current generation, if any has been published
    pub fn load(&self) -> Option<Arc<T>> {
        self.inner.read().data.clone()
    }

    /// Number of publishes so far
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Replace the published generation
    pub fn publish(&self, data: Option<T>) {
        let mut published = self.inner.write();
        published.data = data.map(Arc::new);
        published.generation += 1;
    }
}

/// Type-erased consumer binding: reader callbacks plus output slot
pub(crate) trait Loader: Send + Sync {
    /// Run read and finish over a complete source and publish the result
    fn load(&self, pool: &MapPool, data: &[u8]);
}

struct Binding<R: MapReader> {
    reader: R,
    slot: MapSlot<R::Output>,
}

impl<R: MapReader> Loader for Binding<R> {
    fn load(&self, pool: &MapPool, data: &[u8]) {
        let mut state = ParseState::new(self.slot.load());
        self.reader.read(pool, data, &mut state);

        // An empty source is usually a file caught mid-write
        if data.is_empty() {
            info!(tag = %pool.tag(), "map source is empty, keeping previous data");
            return;
        }

        self.reader.finish(pool, &mut state);
        self.slot.publish(state.cur.take());
    }
}

/// File-backed source state
#[derive(Debug)]
pub struct FileSource {
    pub path: PathBuf,
    /// Last observed modification time, `None` until the file is first seen
    mtime: Mutex<Option<SystemTime>>,
}

impl FileSource {
    pub(crate) fn new(path: PathBuf, mtime: Option<SystemTime>) -> Self {
        FileSource {
            path,
            mtime: Mutex::new(mtime),
        }
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        *self.mtime.lock()
    }

    pub(crate) fn set_mtime(&self, mtime: SystemTime) {
        *self.mtime.lock() = Some(mtime);
    }
}

/// HTTP-backed source state
#[derive(Debug)]
pub struct HttpSource {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Server date of the last successful fetch or 304
    last_checked: Mutex<Option<DateTime<Utc>>>,
}

impl HttpSource {
    pub(crate) fn new(host: String, port: u16, path: String) -> Self {
        HttpSource {
            host,
            port,
            path,
            last_checked: Mutex::new(None),
        }
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        *self.last_checked.lock()
    }

    pub(crate) fn set_last_checked(&self, date: DateTime<Utc>) {
        *self.last_checked.lock() = Some(date);
    }
}

/// Protocol-specific part of a map
#[derive(Debug)]
pub enum Backend {
    File(FileSource),
    Http(HttpSource),
}

/// One configured dynamic data source
pub struct Map {
    id: u32,
    uri: String,
    description: Option<String>,
    signed: bool,
    trusted_key: Option<PublicKey>,
    lock: RefreshLock,
    pool: MapPool,
    loader: Box<dyn Loader>,
    backend: Backend,
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("signed", &self.signed)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Map {
    pub(crate) fn new<R: MapReader>(
        id: u32,
        line: MapLine,
        description: Option<String>,
        backend: Backend,
        reader: R,
        slot: MapSlot<R::Output>,
    ) -> Self {
        Map {
            id,
            pool: MapPool::new(&line.uri),
            uri: line.uri,
            description,
            signed: line.signed,
            trusted_key: line.trusted_key,
            lock: RefreshLock::new(),
            loader: Box::new(Binding { reader, slot }),
            backend,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn trusted_key(&self) -> Option<&PublicKey> {
        self.trusted_key.as_ref()
    }

    pub fn lock(&self) -> &RefreshLock {
        &self.lock
    }

    pub fn pool(&self) -> &MapPool {
        &self.pool
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Local path for file maps
    pub fn file_path(&self) -> Option<&Path> {
        match &self.backend {
            Backend::File(source) => Some(&source.path),
            Backend::Http(_) => None,
        }
    }

    /// Parse verified bytes and publish the new generation
    pub(crate) fn load(&self, data: &[u8]) {
        self.loader.load(&self.pool, data);
    }
}
