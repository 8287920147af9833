//! Argument capture for the current process.

use super::cmdline::{decode_cmdline_text, split_command_line};
use crate::platform;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Provider of the process argv. `None` means the runtime has no argv to give.
pub type PrimaryArgs = Arc<dyn Fn() -> Option<Vec<String>> + Send + Sync>;

/// Obtains the command-line arguments to forward from a subsequent instance.
///
/// The process argv is used whenever the runtime provides it, even when it is
/// empty. Only when it is unavailable does the source consult the fallback file
/// a launcher may have left at `<local-app-data>/<unique_name>/cmdline.txt`.
/// That file is consumed at most once.
#[derive(Clone)]
pub struct ArgumentSource {
    unique_name: String,
    primary: PrimaryArgs,
    app_data_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ArgumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgumentSource")
            .field("unique_name", &self.unique_name)
            .field("app_data_dir", &self.app_data_dir)
            .finish_non_exhaustive()
    }
}

impl ArgumentSource {
    /// Create a source reading the real process argv.
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            primary: Arc::new(process_args),
            app_data_dir: None,
        }
    }

    /// Replace the argv provider.
    pub fn with_primary(
        mut self,
        primary: impl Fn() -> Option<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        self.primary = Arc::new(primary);
        self
    }

    /// Override the local application data root used for the fallback file.
    pub fn with_app_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_data_dir = Some(dir.into());
        self
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Location of the fallback file, if a data directory can be determined.
    pub fn fallback_path(&self) -> Option<PathBuf> {
        let root = match &self.app_data_dir {
            Some(dir) => dir.clone(),
            None => match platform::local_app_data_dir() {
                Ok(dir) => dir,
                Err(e) => {
                    debug!("No local app data dir for cmdline fallback: {}", e);
                    return None;
                }
            },
        };
        Some(platform::cmdline_file_path(&root, &self.unique_name))
    }

    /// Capture the arguments of this process.
    ///
    /// Never fails: every fallback error is logged and yields an empty list.
    pub fn current_args(&self) -> Vec<String> {
        if let Some(args) = (self.primary)() {
            return args;
        }

        debug!("Process argv unavailable, checking cmdline fallback file");
        self.fallback_path()
            .and_then(|path| consume_fallback_file(&path))
            .unwrap_or_default()
    }
}

/// Capture the current process arguments for `unique_name`.
pub fn current_args(unique_name: &str) -> Vec<String> {
    ArgumentSource::new(unique_name).current_args()
}

/// Rust always exposes argv, so this never reports unavailable.
fn process_args() -> Option<Vec<String>> {
    Some(
        std::env::args_os()
            .map(|arg| match arg.into_string() {
                Ok(s) => s,
                Err(raw) => {
                    warn!("Non UTF-8 argument converted lossily: {:?}", raw);
                    raw.to_string_lossy().into_owned()
                }
            })
            .collect(),
    )
}

fn consume_fallback_file(path: &Path) -> Option<Vec<String>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read cmdline fallback {}: {}", path.display(), e);
            return None;
        }
    };

    let text = match decode_cmdline_text(&bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("Ignoring malformed cmdline fallback {}: {}", path.display(), e);
            return None;
        }
    };

    let args = split_command_line(&text);

    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to delete cmdline fallback {}: {}", path.display(), e);
    } else {
        debug!("Consumed cmdline fallback {}", path.display());
    }

    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_fallback(root: &Path, unique_name: &str, text: &str) -> PathBuf {
        let path = platform::cmdline_file_path(root, unique_name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let bytes: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn unavailable_source(root: &Path, unique_name: &str) -> ArgumentSource {
        ArgumentSource::new(unique_name)
            .with_primary(|| None)
            .with_app_data_dir(root)
    }

    #[test]
    fn test_primary_args_returned_as_is() {
        let temp_dir = TempDir::new().unwrap();
        write_fallback(temp_dir.path(), "App", "ignored --z");

        let source = ArgumentSource::new("App")
            .with_primary(|| Some(vec!["app".to_string(), " spaced ".to_string()]))
            .with_app_data_dir(temp_dir.path());

        assert_eq!(source.current_args(), vec!["app", " spaced "]);
        // Fallback untouched while argv is available
        assert!(source.fallback_path().unwrap().exists());
    }

    #[test]
    fn test_empty_primary_args_do_not_trigger_fallback() {
        let temp_dir = TempDir::new().unwrap();
        write_fallback(temp_dir.path(), "App", "app.exe --x");

        let source = ArgumentSource::new("App")
            .with_primary(|| Some(Vec::new()))
            .with_app_data_dir(temp_dir.path());

        assert!(source.current_args().is_empty());
        assert!(source.fallback_path().unwrap().exists());
    }

    #[test]
    fn test_fallback_file_consumed_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_fallback(temp_dir.path(), "App", "app.exe --x");
        let source = unavailable_source(temp_dir.path(), "App");

        assert_eq!(source.current_args(), vec!["app.exe", "--x"]);
        assert!(!path.exists());
        assert!(source.current_args().is_empty());
    }

    #[test]
    fn test_missing_fallback_yields_empty() {
        let temp_dir = TempDir::new().unwrap();
        let source = unavailable_source(temp_dir.path(), "Nothing");
        assert!(source.current_args().is_empty());
    }

    #[test]
    fn test_malformed_fallback_yields_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = platform::cmdline_file_path(temp_dir.path(), "App");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, [0x61, 0x00, 0x62]).unwrap();

        let source = unavailable_source(temp_dir.path(), "App");
        assert!(source.current_args().is_empty());
    }

    #[test]
    fn test_unreadable_fallback_yields_empty() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be makes the read fail
        let path = platform::cmdline_file_path(temp_dir.path(), "App");
        std::fs::create_dir_all(&path).unwrap();

        let source = unavailable_source(temp_dir.path(), "App");
        assert!(source.current_args().is_empty());
    }

    #[test]
    fn test_process_args_available() {
        let args = current_args("instance-relay-test");
        assert!(!args.is_empty());
    }
}
