//! Map registry
//!
//! Owns every configured map together with the shared engine context.
//! Registration parses the definition, checks file access and hands the
//! consumer a [`MapSlot`]; [`MapRegistry::watch`] performs the initial reads
//! and starts one refresh task per map; [`MapRegistry::remove_all`] stops
//! the tasks and forgets the maps.

use crate::config::EngineConfig;
use crate::error::{MapError, Result};
use crate::http::{Resolver, SystemResolver};
use crate::list::MapReader;
use crate::map::{Backend, FileSource, HttpSource, Location, Map, MapLine, MapSlot};
use crate::poller::read_map_file;
use crate::scheduler::refresh_loop;
use crate::signature::SignatureVerifier;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Settings and services shared by all maps of a registry
pub struct EngineContext {
    config: EngineConfig,
    verifier: SignatureVerifier,
    resolver: Arc<dyn Resolver>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// Validate the configuration and build the trusted key set
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let verifier = SignatureVerifier::new(&config.trusted_keys);
        Ok(EngineContext {
            config,
            verifier,
            resolver: Arc::new(SystemResolver),
        })
    }

    /// Replace the name resolver
    pub fn with_resolver<R: Resolver>(mut self, resolver: R) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }
}

/// Check that a map file can be read
///
/// A missing file is accepted since it may appear later; it gets no
/// modification time so the first successful stat triggers a read.
fn check_file_access(path: &Path) -> Result<Option<SystemTime>> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "map file is not found, can be loaded later");
            return Ok(None);
        }
        Err(e) => {
            return Err(MapError::Unreadable {
                path: path.display().to_string(),
                source: e,
            })
        }
    };

    File::open(path).map_err(|e| MapError::Unreadable {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(meta.modified()?))
}

/// Runtime state present between `watch` and `remove_all`
struct Watching {
    runtime: Handle,
    shutdown: watch::Sender<bool>,
}

impl Watching {
    /// Initial read of an already seen file, then spawn the timer task
    fn start(&self, map: &Arc<Map>, engine: &Arc<EngineContext>) -> JoinHandle<()> {
        if let Backend::File(source) = map.backend() {
            if source.mtime().is_some() {
                if let Err(e) = read_map_file(map, source, engine.verifier()) {
                    warn!(tag = %map.pool().tag(), "initial read of {} failed: {}", map.uri(), e);
                }
            }
        }

        self.runtime.spawn(refresh_loop(
            map.clone(),
            engine.clone(),
            self.shutdown.subscribe(),
        ))
    }
}

/// Registered maps and their refresh tasks
pub struct MapRegistry {
    engine: Arc<EngineContext>,
    maps: Vec<Arc<Map>>,
    tasks: Vec<JoinHandle<()>>,
    watching: Option<Watching>,
}

impl MapRegistry {
    pub fn new(engine: EngineContext) -> Self {
        MapRegistry {
            engine: Arc::new(engine),
            maps: Vec::new(),
            tasks: Vec::new(),
            watching: None,
        }
    }

    pub fn engine(&self) -> &Arc<EngineContext> {
        &self.engine
    }

    /// Register a map definition with a consumer reader
    ///
    /// Returns the slot through which the consumer sees published
    /// generations. Invalid definitions and unreadable existing files are
    /// rejected. A map added while watching starts refreshing at once.
    pub fn add<R: MapReader>(
        &mut self,
        line: &str,
        description: Option<&str>,
        reader: R,
    ) -> Result<MapSlot<R::Output>> {
        let parsed = MapLine::parse(line)?;

        let backend = match &parsed.location {
            Location::File(path) => {
                let mtime = check_file_access(path)?;
                Backend::File(FileSource::new(path.clone(), mtime))
            }
            Location::Http { host, port, path } => {
                Backend::Http(HttpSource::new(host.clone(), *port, path.clone()))
            }
        };

        let slot = MapSlot::new();
        let map = Map::new(
            rand::random::<u32>(),
            parsed,
            description.map(str::to_string),
            backend,
            reader,
            slot.clone(),
        );
        info!(
            tag = %map.pool().tag(),
            map_id = map.id(),
            description = map.description().unwrap_or(""),
            "added map {}",
            map.uri()
        );

        let map = Arc::new(map);
        if let Some(watching) = &self.watching {
            self.tasks.push(watching.start(&map, &self.engine));
        }
        self.maps.push(map);
        Ok(slot)
    }

    /// Registered maps in registration order
    pub fn maps(&self) -> &[Arc<Map>] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn is_watching(&self) -> bool {
        self.watching.is_some()
    }

    /// Read existing files once and start refreshing every map
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// watching does nothing.
    pub fn watch(&mut self) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| MapError::Config(format!("watching maps requires a runtime: {}", e)))?;

        if self.is_watching() {
            return Ok(());
        }

        let (shutdown, _) = watch::channel(false);
        let watching = Watching { runtime, shutdown };
        for map in &self.maps {
            self.tasks.push(watching.start(map, &self.engine));
        }

        debug!(maps = self.maps.len(), "watching maps");
        self.watching = Some(watching);
        Ok(())
    }

    /// Stop all refresh tasks and drop every map
    ///
    /// Slots already handed to consumers keep their last generation.
    pub fn remove_all(&mut self) {
        if let Some(watching) = self.watching.take() {
            let _ = watching.shutdown.send(true);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if !self.maps.is_empty() {
            debug!(maps = self.maps.len(), "removing all maps");
        }
        self.maps.clear();
    }
}

impl Drop for MapRegistry {
    fn drop(&mut self) {
        self.remove_all();
    }
}
