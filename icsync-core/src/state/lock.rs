//! One sync per ledger at a time.

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{SyncError, SyncResult};

/// Holds an exclusive lock on `<ledger>.lock` until dropped.
#[derive(Debug)]
pub struct SyncLock {
    _file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Acquire the lock, failing immediately if another run holds it.
    pub fn acquire(ledger_path: &Path) -> SyncResult<Self> {
        let path = lock_path(ledger_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| SyncError::AlreadyRunning(path.clone()))?;

        tracing::debug!(path = %path.display(), "Acquired sync lock");
        Ok(SyncLock { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(ledger_path: &Path) -> PathBuf {
    let mut name = OsString::from(ledger_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_fails_until_first_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("state").join("work.db");

        let first = SyncLock::acquire(&ledger).unwrap();
        assert_eq!(first.path(), dir.path().join("state").join("work.db.lock"));

        let second = SyncLock::acquire(&ledger);
        assert!(matches!(second, Err(SyncError::AlreadyRunning(_))));

        drop(first);
        assert!(SyncLock::acquire(&ledger).is_ok());
    }
}
