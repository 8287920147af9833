//! System-wide named lock.
//!
//! Backed by an exclusive advisory lock on a per-user lock file whose name is
//! derived from the lock name. The OS drops the lock when the holding process
//! exits for any reason, so a crashed first instance never blocks later
//! launches.
//!
//! Lock files are never deleted: unlinking a file another process is about to
//! lock would let two processes hold "the same" lock on different inodes.

use crate::config::PathsConfig;
use crate::platform::derived_file_stem;
use crate::{RelayError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An acquired named lock. Dropping releases it.
#[derive(Debug)]
pub struct NamedLock {
    name: String,
    path: PathBuf,
    file: Option<File>,
}

impl NamedLock {
    /// Path of the lock file for `name` under `state_dir`.
    pub fn lock_path(state_dir: &Path, name: &str) -> PathBuf {
        state_dir.join(format!(
            "{}.{}",
            derived_file_stem(name),
            PathsConfig::LOCK_FILE_EXTENSION
        ))
    }

    /// Try to take the lock without waiting.
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire(state_dir: &Path, name: &str) -> Result<Option<Self>> {
        let path = Self::lock_path(state_dir, name);
        let lock_error = |message: &str, source: std::io::Error| RelayError::Lock {
            path: path.clone(),
            message: message.to_string(),
            source: Some(source),
        };

        fs::create_dir_all(state_dir).map_err(|e| lock_error("failed to create state directory", e))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| lock_error("failed to open lock file", e))?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if is_contended(&e) {
                debug!("Lock {} is held by another process", name);
                return Ok(None);
            }
            return Err(lock_error("failed to lock", e));
        }

        // Holder PID for diagnostics only; the lock itself is what matters.
        if let Err(e) = file
            .set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
        {
            debug!("Failed to record holder PID in {}: {}", path.display(), e);
        }

        debug!("Acquired lock {} at {}", name, path.display());
        Ok(Some(Self {
            name: name.to_string(),
            path,
            file: Some(file),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Release the lock. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                // Closing the handle below releases it regardless
                warn!("Failed to unlock {}: {}", self.path.display(), e);
            }
            debug!("Released lock {}", self.name);
        }
    }
}

impl Drop for NamedLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    match (err.raw_os_error(), fs2::lock_contended_error().raw_os_error()) {
        (Some(code), Some(contended)) if code == contended => true,
        _ => err.kind() == std::io::ErrorKind::WouldBlock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_contended() {
        let temp_dir = TempDir::new().unwrap();
        let first = NamedLock::try_acquire(temp_dir.path(), "app-alice").unwrap();
        assert!(first.is_some());

        let second = NamedLock::try_acquire(temp_dir.path(), "app-alice").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_release_allows_reacquire() {
        let temp_dir = TempDir::new().unwrap();
        let mut first = NamedLock::try_acquire(temp_dir.path(), "app")
            .unwrap()
            .unwrap();
        first.release();
        first.release();
        assert!(!first.is_held());

        let again = NamedLock::try_acquire(temp_dir.path(), "app").unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_drop_releases() {
        let temp_dir = TempDir::new().unwrap();
        {
            let _held = NamedLock::try_acquire(temp_dir.path(), "scoped").unwrap();
        }
        assert!(NamedLock::try_acquire(temp_dir.path(), "scoped")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_distinct_names_do_not_contend() {
        let temp_dir = TempDir::new().unwrap();
        let a = NamedLock::try_acquire(temp_dir.path(), "app-one").unwrap();
        let b = NamedLock::try_acquire(temp_dir.path(), "app-two").unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[test]
    fn test_lock_file_persists_after_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock = NamedLock::try_acquire(temp_dir.path(), "keep").unwrap().unwrap();
        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(path.exists());
    }
}
