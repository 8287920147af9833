//! Platform-specific path utilities.
//!
//! This module provides functions to get platform-specific paths for:
//! - The per-user state directory holding instance locks and channel endpoints
//! - The per-user local application data directory (command-line fallback file)
//! - File names derived from instance identifiers

use crate::config::PathsConfig;
use crate::error::{RelayError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Get the per-user directory for lock files and channel endpoint records.
///
/// Every process of one account must land on the same directory whatever its
/// environment, so on Unix the path is keyed by uid rather than by
/// `$XDG_RUNTIME_DIR`, `$TMPDIR` or `$HOME`. The directory is created `0700`
/// and rejected if another account owns it.
///
/// # Platform Behavior
/// - **Linux/macOS**: `/tmp/instance-relay-{uid}`
/// - **Windows**: `%LOCALAPPDATA%\instance-relay`
pub fn state_dir() -> Result<PathBuf> {
    #[cfg(unix)]
    {
        let uid = super::user::current_uid();
        let dir = Path::new(PathsConfig::UNIX_STATE_ROOT)
            .join(format!("{}-{}", PathsConfig::STATE_DIR_NAME, uid));
        ensure_private_dir(&dir, uid)?;
        Ok(dir)
    }

    #[cfg(not(unix))]
    {
        let base = dirs::cache_dir().ok_or_else(|| RelayError::Config {
            message: "Could not determine a per-user cache directory".to_string(),
        })?;
        Ok(base.join(PathsConfig::STATE_DIR_NAME))
    }
}

/// Create `dir` owner-only, or verify an existing one belongs to `uid`.
#[cfg(unix)]
fn ensure_private_dir(dir: &Path, uid: u32) -> Result<()> {
    use std::fs::{self, DirBuilder, Permissions};
    use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};

    match DirBuilder::new().mode(0o700).create(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(RelayError::io_with_path(e, dir)),
    }

    // symlink_metadata: a planted symlink must not redirect the lock files
    let meta = fs::symlink_metadata(dir).map_err(|e| RelayError::io_with_path(e, dir))?;
    if !meta.is_dir() || meta.uid() != uid {
        return Err(RelayError::Config {
            message: format!(
                "State directory {} is not a directory owned by uid {}",
                dir.display(),
                uid
            ),
        });
    }

    if meta.mode() & 0o077 != 0 {
        fs::set_permissions(dir, Permissions::from_mode(0o700))
            .map_err(|e| RelayError::io_with_path(e, dir))?;
    }
    Ok(())
}

/// Get the per-user local application data directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.local/share` (XDG_DATA_HOME)
/// - **Windows**: `%LOCALAPPDATA%`
/// - **macOS**: `~/Library/Application Support`
pub fn local_app_data_dir() -> Result<PathBuf> {
    dirs::data_local_dir().ok_or_else(|| RelayError::Config {
        message: "Could not determine local application data directory".to_string(),
    })
}

/// Path of the command-line fallback file for an application.
///
/// Returns `{app_data_root}/{unique_name}/cmdline.txt`.
pub fn cmdline_file_path(app_data_root: &Path, unique_name: &str) -> PathBuf {
    app_data_root
        .join(unique_name)
        .join(PathsConfig::CMDLINE_FILENAME)
}

/// Derive a file-system safe stem from an arbitrary identifier.
///
/// Identifiers may contain characters that are not valid in file names
/// (`:` on Windows, `/` everywhere). The stem keeps a readable, sanitized prefix
/// and appends a SHA-256 digest of the full identifier so distinct identifiers
/// never collide after sanitizing.
pub fn derived_file_stem(identifier: &str) -> String {
    let prefix: String = identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(PathsConfig::FILE_STEM_PREFIX_LEN)
        .collect();

    let digest = Sha256::digest(identifier.as_bytes());
    format!("{}-{}", prefix, hex::encode(&digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_state_dir_is_keyed_by_uid_not_environment() {
        use std::os::unix::fs::MetadataExt;

        let uid = crate::platform::user::current_uid();
        let dir = state_dir().unwrap();
        assert_eq!(
            dir,
            Path::new(PathsConfig::UNIX_STATE_ROOT).join(format!("instance-relay-{}", uid))
        );

        let meta = std::fs::metadata(&dir).unwrap();
        assert_eq!(meta.uid(), uid);
        assert_eq!(meta.mode() & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_dir_permissions_are_tightened() {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = temp_dir.path().join("state");
        std::fs::create_dir(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        let uid = crate::platform::user::current_uid();
        ensure_private_dir(&dir, uid).unwrap();
        assert_eq!(std::fs::metadata(&dir).unwrap().mode() & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_dir_owned_by_other_uid_is_rejected() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let uid = crate::platform::user::current_uid();
        let result = ensure_private_dir(temp_dir.path(), uid.wrapping_add(1));
        assert!(matches!(result, Err(RelayError::Config { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_dir_rejects_symlink() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let target = temp_dir.path().join("target");
        let link = temp_dir.path().join("link");
        std::fs::create_dir(&target).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let uid = crate::platform::user::current_uid();
        assert!(ensure_private_dir(&link, uid).is_err());
    }

    #[test]
    fn test_cmdline_file_path_layout() {
        let path = cmdline_file_path(Path::new("/data"), "MyApp");
        assert_eq!(path, PathBuf::from("/data").join("MyApp").join("cmdline.txt"));
    }

    #[test]
    fn test_derived_file_stem_is_sanitized() {
        let stem = derived_file_stem("My App/v2:alice");
        assert!(stem.starts_with("My_App_v2_alice-"));
        assert!(stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_derived_file_stem_is_deterministic_and_distinct() {
        assert_eq!(derived_file_stem("app:bob"), derived_file_stem("app:bob"));
        // Both sanitize to the same prefix but must not collide
        assert_ne!(derived_file_stem("app:bob"), derived_file_stem("app/bob"));
    }

    #[test]
    fn test_derived_file_stem_truncates_long_names() {
        let long = "x".repeat(200);
        let stem = derived_file_stem(&long);
        assert_eq!(stem.len(), PathsConfig::FILE_STEM_PREFIX_LEN + 1 + 32);
    }
}
