//! On-disk buffers for one HTTP fetch
//!
//! The map body goes to a fresh temporary file; the discovered key and the
//! signature go to siblings named `<tmp>.pub` and `<tmp>.sig`. All three are
//! removed when the buffers are dropped.

use crate::error::{MapError, Result};
use crate::io::{with_suffix, MappedFile};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Remote object fetched by a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The map body itself
    File,
    /// `<path>.pub`
    Pubkey,
    /// `<path>.sig`
    Signature,
}

impl Resource {
    /// Suffix appended to the map path on the server and to the temp file
    pub fn suffix(&self) -> &'static str {
        match self {
            Resource::File => "",
            Resource::Pubkey => ".pub",
            Resource::Signature => ".sig",
        }
    }
}

/// Temporary files backing one fetch
#[derive(Debug)]
pub struct FetchBuffers {
    body: NamedTempFile,
    pubkey: PathBuf,
    signature: PathBuf,
}

impl FetchBuffers {
    /// Create the body file as `<dir>/map<id>-XXXXXX`
    pub fn create(dir: &Path, map_id: u32) -> Result<Self> {
        let body = tempfile::Builder::new()
            .prefix(&format!("map{}-", map_id))
            .tempfile_in(dir)
            .map_err(|e| MapError::TempFile(format!("{}: {}", dir.display(), e)))?;

        let pubkey = with_suffix(body.path(), Resource::Pubkey.suffix());
        let signature = with_suffix(body.path(), Resource::Signature.suffix());

        Ok(FetchBuffers {
            body,
            pubkey,
            signature,
        })
    }

    /// Buffer path for a resource
    pub fn path(&self, resource: Resource) -> &Path {
        match resource {
            Resource::File => self.body.path(),
            Resource::Pubkey => &self.pubkey,
            Resource::Signature => &self.signature,
        }
    }

    /// Map a completed buffer into memory
    pub fn map(&self, resource: Resource) -> Result<MappedFile> {
        MappedFile::open(self.path(resource))
    }
}

impl Drop for FetchBuffers {
    fn drop(&mut self) {
        for path in [&self.pubkey, &self.signature] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => debug!(path = %path.display(), "cannot remove fetch buffer: {}", e),
            }
        }
    }
}
