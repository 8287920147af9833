//! Centralized configuration for instance-relay.
//!
//! Constants for channel transport limits, timeouts, and the on-disk layout
//! shared by every process of an application. Values that a host may want to
//! change per run are exposed through [`crate::ArbitratorBuilder`] instead.

use std::time::Duration;

/// Library-level configuration.
pub struct RelayConfig;

impl RelayConfig {
    /// Appended to the instance identifier to form the channel name.
    pub const CHANNEL_NAME_SUFFIX: &'static str = ":SingleInstanceIPCChannel";
}

/// Message channel transport configuration.
pub struct ChannelConfig;

impl ChannelConfig {
    /// Upper bound for one handoff from a subsequent instance.
    pub const PUBLISH_TIMEOUT: Duration = Duration::from_millis(300);
    /// Delay between connection attempts while the subscriber is not yet reachable.
    pub const PUBLISH_RETRY_INTERVAL: Duration = Duration::from_millis(20);
    /// Maximum frame payload accepted by a subscriber (1 MiB).
    pub const MAX_MESSAGE_SIZE: usize = 1_048_576;
    pub const MAX_CONNECTIONS: usize = 64;
    /// How long a connected peer has to name the channel before it is dropped.
    pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
    /// Buffered messages between connection readers and the dispatcher.
    pub const DISPATCH_QUEUE_CAPACITY: usize = 256;
    pub const BIND_ADDR: &'static str = "127.0.0.1:0";
}

/// On-disk names.
pub struct PathsConfig;

impl PathsConfig {
    /// Name of the directory holding locks and endpoint records.
    pub const STATE_DIR_NAME: &'static str = "instance-relay";
    /// Parent of the uid-keyed state directory on Unix.
    pub const UNIX_STATE_ROOT: &'static str = "/tmp";
    pub const LOCK_FILE_EXTENSION: &'static str = "lock";
    pub const ENDPOINT_FILE_EXTENSION: &'static str = "endpoint.json";
    pub const CMDLINE_FILENAME: &'static str = "cmdline.txt";
    /// Readable prefix kept in derived file names before the digest.
    pub const FILE_STEM_PREFIX_LEN: usize = 32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(ChannelConfig::PUBLISH_TIMEOUT >= Duration::from_millis(100));
        assert!(ChannelConfig::PUBLISH_TIMEOUT < Duration::from_secs(1));
        assert!(ChannelConfig::PUBLISH_RETRY_INTERVAL < ChannelConfig::PUBLISH_TIMEOUT);
    }

    #[test]
    fn test_suffix_is_stable() {
        assert!(RelayConfig::CHANNEL_NAME_SUFFIX.starts_with(':'));
    }
}
