//! File-backed map refresh
//!
//! Each timer tick stats the file and rereads it only when its modification
//! time moved forward, or when it has never been seen before.

use crate::error::Result;
use crate::io::MappedFile;
use crate::map::{FileSource, Map};
use crate::signature::SignatureVerifier;
use tracing::{debug, error, info};

/// Result of one file refresh cycle
#[derive(Debug)]
pub enum PollOutcome {
    /// Another holder had the refresh lock; nothing was touched
    Locked,
    /// Modification time unchanged or file missing
    Unchanged,
    /// New data was verified, parsed and published
    Reloaded,
    /// Reading or verification failed; the previous generation stays
    Failed(crate::error::MapError),
}

impl PollOutcome {
    pub fn is_locked(&self) -> bool {
        matches!(self, PollOutcome::Locked)
    }
}

/// Read, verify, parse and publish a file map
pub fn read_map_file(map: &Map, source: &FileSource, verifier: &SignatureVerifier) -> Result<()> {
    let bytes = MappedFile::open(&source.path).map_err(|e| {
        error!(tag = %map.pool().tag(), path = %source.path.display(), "can't open map: {}", e);
        e
    })?;

    if map.is_signed() {
        verifier.check_file(&source.path, map.trusted_key(), &bytes)?;
    }

    map.load(&bytes);
    Ok(())
}

/// One timer tick for a file map
pub fn poll_file(map: &Map, source: &FileSource, verifier: &SignatureVerifier) -> PollOutcome {
    let tag = map.pool().tag();

    let _guard = match map.lock().try_acquire() {
        Some(guard) => guard,
        None => {
            info!(
                tag = %tag,
                "don't try to reread map as it is locked by other process, will reread it later"
            );
            return PollOutcome::Locked;
        }
    };

    let modified = match std::fs::metadata(&source.path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) => {
            debug!(tag = %tag, path = %source.path.display(), "cannot stat map: {}", e);
            return PollOutcome::Unchanged;
        }
    };

    match source.mtime() {
        Some(known) if modified <= known => return PollOutcome::Unchanged,
        _ => source.set_mtime(modified),
    }

    info!(tag = %tag, path = %source.path.display(), "rereading map file");
    match read_map_file(map, source, verifier) {
        Ok(()) => PollOutcome::Reloaded,
        Err(e) => PollOutcome::Failed(e),
    }
}
