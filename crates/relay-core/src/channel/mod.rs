//! Named local message channel.
//!
//! A lightweight publish/subscribe transport between processes of the same
//! user on one machine. A channel is identified only by its name: the
//! subscriber listens on a loopback TCP port and records it in an endpoint file
//! derived from the name, publishers look that file up. There is no discovery
//! beyond knowing the exact name.
//!
//! # Architecture
//!
//! - **Subscriber**: Held by the first instance, delivers every message to one handler
//! - **Publisher**: Transient, sends one message within a deadline
//! - **Protocol**: Shared framing used by both
//! - **Endpoint**: On-disk rendezvous record

pub mod endpoint;
pub mod protocol;
pub mod publisher;
pub mod subscriber;

pub use endpoint::EndpointRecord;
pub use subscriber::{MessageHandler, Subscription};

use crate::config::ChannelConfig;
use crate::{platform, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Entry point for subscribing to and publishing on named channels.
///
/// Both sides must use the same state directory, which defaults to the
/// per-user [`platform::state_dir`].
#[derive(Debug, Clone)]
pub struct MessageChannel {
    state_dir: PathBuf,
}

impl MessageChannel {
    /// Use channels rooted at `state_dir`.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Use channels rooted at the per-user state directory.
    pub fn at_default_location() -> Result<Self> {
        Ok(Self::new(platform::state_dir()?))
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Start receiving messages on `name`.
    ///
    /// Must be called within a tokio runtime. The subscription keeps delivering
    /// until it is disposed or dropped; with no publishers it simply waits.
    pub async fn subscribe(
        &self,
        name: &str,
        handler: impl MessageHandler,
    ) -> Result<Subscription> {
        let handler: Arc<dyn MessageHandler> = Arc::new(handler);
        Subscription::start(name, endpoint::endpoint_path(&self.state_dir, name), handler).await
    }

    /// Send one message on `name` within the default publish timeout.
    pub async fn publish(&self, name: &str, payload: &[u8]) -> Result<()> {
        self.publish_with_timeout(name, payload, ChannelConfig::PUBLISH_TIMEOUT)
            .await
    }

    /// Send one message on `name`, giving up after `timeout`.
    ///
    /// Returns once the subscriber has queued the message for its handler.
    pub async fn publish_with_timeout(
        &self,
        name: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        publisher::publish(
            &endpoint::endpoint_path(&self.state_dir, name),
            name,
            payload,
            timeout,
        )
        .await
    }
}
