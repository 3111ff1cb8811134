//! Per-artifact advisory locks

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::trace;

use super::CacheError;

/// Exclusive lock on one artifact, released when dropped
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            trace!("unlock of {} failed: {}", self.path.display(), err);
        }
    }
}

/// Block until the exclusive lock at `lock_path` is held
pub(crate) fn acquire(lock_path: &Path) -> Result<LockGuard, CacheError> {
    let failed = |source| CacheError::LockAcquisitionFailed {
        path: lock_path.to_path_buf(),
        source,
    };

    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(failed)?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(failed)?;

    file.lock_exclusive().map_err(failed)?;
    trace!("locked {}", lock_path.display());

    Ok(LockGuard {
        file,
        path: lock_path.to_path_buf(),
    })
}
