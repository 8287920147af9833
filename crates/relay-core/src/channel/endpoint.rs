//! Channel endpoint records.
//!
//! A subscriber publishes where it listens by writing a small JSON record
//! next to the instance lock. Publishers look the record up by channel name.
//! Records are replaced with an atomic rename so a reader never observes a
//! partially written file.

use crate::config::PathsConfig;
use crate::platform::derived_file_stem;
use crate::{RelayError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;

/// Where a channel's subscriber can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub channel: String,
    pub pid: u32,
    pub port: u16,
    pub started_at: String,
}

impl EndpointRecord {
    pub fn new(channel: impl Into<String>, port: u16) -> Self {
        Self {
            channel: channel.into(),
            pid: process::id(),
            port,
            started_at: Utc::now().to_rfc3339(),
        }
    }

    /// Whether this record was written by this process for `port`.
    pub fn is_owned_by_current_process(&self, port: u16) -> bool {
        self.pid == process::id() && self.port == port
    }
}

/// Path of the endpoint record for `channel` under `state_dir`.
pub fn endpoint_path(state_dir: &Path, channel: &str) -> PathBuf {
    state_dir.join(format!(
        "{}.{}",
        derived_file_stem(channel),
        PathsConfig::ENDPOINT_FILE_EXTENSION
    ))
}

/// Read an endpoint record.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn read_record(path: &Path) -> Result<Option<EndpointRecord>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RelayError::io_with_path(e, path)),
    };

    let record = serde_json::from_slice(&contents).map_err(|e| RelayError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(record))
}

/// Write an endpoint record atomically.
///
/// 1. Serialize to a temp file with a PID suffix
/// 2. Sync the temp file
/// 3. Rename over the target path
pub fn write_record(path: &Path, record: &EndpointRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RelayError::Io {
            message: format!("Failed to create directory {}", parent.display()),
            path: Some(parent.to_path_buf()),
            source: Some(e),
        })?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", process::id()));
    let serialized = serde_json::to_vec_pretty(record)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| RelayError::Io {
                message: format!("Failed to create temp file {}", temp_path.display()),
                path: Some(temp_path.clone()),
                source: Some(e),
            })?;

        file.write_all(&serialized)
            .and_then(|_| file.sync_all())
            .map_err(|e| RelayError::Io {
                message: format!("Failed to write temp file {}", temp_path.display()),
                path: Some(temp_path.clone()),
                source: Some(e),
            })?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        RelayError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        }
    })?;

    debug!("Wrote endpoint record {}", path.display());
    Ok(())
}

/// Remove the record at `path` if this process wrote it for `port`.
///
/// A newer first instance may already have replaced the record; that one is
/// left alone.
pub fn remove_record_if_owned(path: &Path, port: u16) {
    match read_record(path) {
        Ok(Some(record)) if record.is_owned_by_current_process(port) => {
            if let Err(e) = fs::remove_file(path) {
                debug!("Failed to remove endpoint record {}: {}", path.display(), e);
            }
        }
        Ok(_) => {}
        Err(e) => debug!("Leaving unreadable endpoint record {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = endpoint_path(temp_dir.path(), "app:chan");
        let record = EndpointRecord::new("app:chan", 4242);

        write_record(&path, &record).unwrap();
        assert_eq!(read_record(&path).unwrap(), Some(record));
    }

    #[test]
    fn test_read_missing_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = endpoint_path(temp_dir.path(), "missing");
        assert!(read_record(&path).unwrap().is_none());
    }

    #[test]
    fn test_read_corrupt_record_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = endpoint_path(temp_dir.path(), "corrupt");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(read_record(&path), Err(RelayError::Json { .. })));
    }

    #[test]
    fn test_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = endpoint_path(&temp_dir.path().join("nested").join("dir"), "c");
        write_record(&path, &EndpointRecord::new("c", 1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_remove_only_own_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = endpoint_path(temp_dir.path(), "c");

        let mut foreign = EndpointRecord::new("c", 5000);
        foreign.pid = foreign.pid.wrapping_add(1);
        write_record(&path, &foreign).unwrap();
        remove_record_if_owned(&path, 5000);
        assert!(path.exists());

        write_record(&path, &EndpointRecord::new("c", 5000)).unwrap();
        remove_record_if_owned(&path, 5001);
        assert!(path.exists());
        remove_record_if_owned(&path, 5000);
        assert!(!path.exists());
    }

    #[test]
    fn test_endpoint_paths_differ_per_channel() {
        let dir = Path::new("/state");
        assert_ne!(endpoint_path(dir, "a:chan"), endpoint_path(dir, "b:chan"));
        assert!(endpoint_path(dir, "a:chan")
            .to_string_lossy()
            .ends_with(".endpoint.json"));
    }
}
