//! Builder for configuring an Arbitrator.

use super::{Arbitrator, HeldResources, InstanceHandler};
use crate::args::PrimaryArgs;
use crate::channel::MessageChannel;
use crate::codec::{ArgsCodec, JsonArgsCodec};
use crate::config::ChannelConfig;
use crate::error::{RelayError, Result};
use crate::platform;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Builder for configuring [`Arbitrator`] initialization.
///
/// Every process of an application must agree on the state directory, user
/// name, and codec, so overrides are mostly useful for tests and for hosts
/// that manage their own per-user directories.
///
/// # Example
///
/// ```rust,ignore
/// use instance_relay::Arbitrator;
///
/// let arbitrator = Arbitrator::builder(|args: Vec<String>| open_files(args))
///     .publish_timeout(Duration::from_millis(500))
///     .build()?;
/// ```
pub struct ArbitratorBuilder {
    handler: Arc<dyn InstanceHandler>,
    state_dir: Option<PathBuf>,
    app_data_dir: Option<PathBuf>,
    user_name: Option<String>,
    publish_timeout: Duration,
    codec: Arc<dyn ArgsCodec>,
    primary_args: Option<PrimaryArgs>,
}

impl ArbitratorBuilder {
    /// Create a new builder delivering forwarded arguments to `handler`.
    pub fn new(handler: impl InstanceHandler) -> Self {
        Self {
            handler: Arc::new(handler),
            state_dir: None,
            app_data_dir: None,
            user_name: None,
            publish_timeout: ChannelConfig::PUBLISH_TIMEOUT,
            codec: Arc::new(JsonArgsCodec),
            primary_args: None,
        }
    }

    /// Directory for lock files and channel endpoint records.
    ///
    /// Default: the per-user runtime or cache directory
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Local application data root searched for `<unique_name>/cmdline.txt`.
    ///
    /// Default: the platform local app data directory
    pub fn app_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_data_dir = Some(dir.into());
        self
    }

    /// User name scoping the instance identifier.
    ///
    /// Default: the current OS user
    pub fn user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    /// Upper bound for forwarding arguments from a subsequent instance.
    ///
    /// Default: 300ms
    pub fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Codec for the argument payload.
    ///
    /// Default: [`JsonArgsCodec`]
    pub fn codec(mut self, codec: impl ArgsCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Replace the process argv provider used on the subsequent path.
    ///
    /// Returning `None` makes the arbitrator consult the cmdline fallback file.
    pub fn primary_args(
        mut self,
        primary: impl Fn() -> Option<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        self.primary_args = Some(Arc::new(primary));
        self
    }

    /// Build the Arbitrator.
    pub fn build(self) -> Result<Arbitrator> {
        if self.publish_timeout.is_zero() {
            return Err(RelayError::Validation {
                field: "publish_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let user_name = self.user_name.unwrap_or_else(platform::current_user_name);
        if user_name.is_empty() {
            return Err(RelayError::Validation {
                field: "user_name".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let state_dir = match self.state_dir {
            Some(dir) => dir,
            None => platform::state_dir()?,
        };

        Ok(Arbitrator {
            channel: MessageChannel::new(state_dir),
            app_data_dir: self.app_data_dir,
            user_name,
            publish_timeout: self.publish_timeout,
            codec: self.codec,
            handler: self.handler,
            primary_args: self.primary_args,
            resources: Arc::new(Mutex::new(HeldResources::default())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let arbitrator = ArbitratorBuilder::new(|_args: Vec<String>| {})
            .state_dir(temp_dir.path())
            .build()
            .unwrap();

        assert_eq!(arbitrator.publish_timeout(), ChannelConfig::PUBLISH_TIMEOUT);
        assert_eq!(arbitrator.state_dir(), temp_dir.path());
        assert_eq!(arbitrator.user_name(), platform::current_user_name());
    }

    #[test]
    fn test_builder_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let arbitrator = ArbitratorBuilder::new(|_args: Vec<String>| {})
            .state_dir(temp_dir.path())
            .user_name("bob")
            .publish_timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        assert_eq!(arbitrator.user_name(), "bob");
        assert_eq!(arbitrator.publish_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = ArbitratorBuilder::new(|_args: Vec<String>| {})
            .state_dir("/tmp/unused")
            .publish_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(RelayError::Validation { .. })));
    }

    #[test]
    fn test_builder_rejects_empty_user() {
        let result = ArbitratorBuilder::new(|_args: Vec<String>| {})
            .state_dir("/tmp/unused")
            .user_name("")
            .build();
        assert!(matches!(result, Err(RelayError::Validation { .. })));
    }
}
