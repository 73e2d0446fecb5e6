//! Read-only file mapping for map sources, keys and signatures

use crate::error::{MapError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

/// Whole-file read-only view
///
/// Zero-length files cannot be mapped on every platform, so they are
/// represented without a mapping.
pub enum MappedFile {
    /// Zero-length file
    Empty,
    /// Memory-mapped contents
    Mapped(Mmap),
}

impl MappedFile {
    /// Map an already opened file
    pub fn from_file(file: &File, path: &Path) -> Result<Self> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(MappedFile::Empty);
        }

        // The engine never truncates source files while a mapping is alive;
        // external writers are expected to replace files atomically.
        let mmap = unsafe { Mmap::map(file) }.map_err(|e| MapError::Mmap {
            path: path.display().to_string(),
            source: e,
        })?;

        Ok(MappedFile::Mapped(mmap))
    }

    /// Open and map a file by path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_file(&file, path)
    }
}

impl Deref for MappedFile {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            MappedFile::Empty => &[],
            MappedFile::Mapped(mmap) => mmap,
        }
    }
}

/// Path with a suffix appended to its final component (`list` -> `list.sig`)
pub fn with_suffix(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    os.into()
}
