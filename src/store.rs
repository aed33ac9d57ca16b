//! Exclusive, scoped access to the document file.
//!
//! An advisory lock (`flock`) on a sidecar `<file>.lock` is held from the
//! read through the single final write, so two runs cannot interleave. The
//! write goes to a temporary file in the same directory which then replaces
//! the document, so a failed write leaves the previous revision intact.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PatchError, Result};

pub struct LockedDocument {
    lock: File,
    path: PathBuf,
}

/// `Questions.kt` → `Questions.kt.lock`, next to the document.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

impl LockedDocument {
    /// Check `path` is readable, then block until its lock is held.
    pub fn open(path: &Path) -> Result<Self> {
        File::open(path).map_err(|source| PatchError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let lock_file = lock_path(path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_file)
            .map_err(|source| PatchError::Lock {
                path: lock_file.clone(),
                source,
            })?;
        FileExt::lock_exclusive(&lock).map_err(|source| PatchError::Lock {
            path: lock_file.clone(),
            source,
        })?;
        debug!(path = %path.display(), lock = %lock_file.display(), "acquired document lock");

        Ok(Self {
            lock,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|source| PatchError::Read {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the whole file with `text`.
    pub fn write(&self, text: &str) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let replace = || -> std::io::Result<()> {
            let permissions = fs::metadata(&self.path)?.permissions();
            let mut temp = NamedTempFile::new_in(dir)?;
            temp.write_all(text.as_bytes())?;
            temp.as_file().sync_all()?;
            temp.as_file().set_permissions(permissions)?;
            temp.persist(&self.path).map_err(|err| err.error)?;
            Ok(())
        };
        replace().map_err(|source| PatchError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for LockedDocument {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.lock) {
            debug!(path = %self.path.display(), "failed to release document lock: {err}");
        }
    }
}
