//! First-instance arbitration.
//!
//! An [`Arbitrator`] decides at startup whether this process is the first
//! instance of an application for the current user. The first instance keeps a
//! named lock and a channel subscription for its lifetime; every later launch
//! forwards its arguments over the channel and exits.
//!
//! # Example
//!
//! ```rust,ignore
//! use instance_relay::{Arbitrator, Role};
//!
//! #[tokio::main]
//! async fn main() -> instance_relay::Result<()> {
//!     let mut arbitrator = Arbitrator::new(|args: Vec<String>| {
//!         println!("forwarded: {:?}", args);
//!     })?;
//!
//!     match arbitrator.become_first_or_signal("com.example.editor").await? {
//!         Role::First => run_app().await,
//!         Role::Subsequent { handoff } => std::process::exit(handoff.map_or_else(|e| e.exit_code(), |_| 0)),
//!     }
//!     Ok(())
//! }
//! ```

mod builder;

pub use builder::ArbitratorBuilder;

use crate::args::{ArgumentSource, PrimaryArgs};
use crate::channel::{MessageChannel, Subscription};
use crate::codec::ArgsCodec;
use crate::config::RelayConfig;
use crate::lock::NamedLock;
use crate::{RelayError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

/// Host callback receiving the arguments forwarded by each later launch.
///
/// Invoked from a tokio worker, one launch at a time.
pub trait InstanceHandler: Send + Sync + 'static {
    fn on_invoked(&self, args: Vec<String>);
}

impl<F> InstanceHandler for F
where
    F: Fn(Vec<String>) + Send + Sync + 'static,
{
    fn on_invoked(&self, args: Vec<String>) {
        self(args)
    }
}

/// Which role this process ended up with.
#[derive(Debug)]
pub enum Role {
    /// This process holds the lock and receives forwarded arguments.
    First,
    /// Another process is first. `handoff` is the outcome of forwarding this
    /// process's arguments; the caller should exit either way.
    Subsequent { handoff: Result<()> },
}

impl Role {
    pub fn is_first(&self) -> bool {
        matches!(self, Role::First)
    }

    /// Process exit status for a subsequent instance (0 for the first).
    pub fn exit_code(&self) -> i32 {
        match self {
            Role::First | Role::Subsequent { handoff: Ok(()) } => 0,
            Role::Subsequent { handoff: Err(e) } => e.exit_code(),
        }
    }
}

/// Build the instance identifier: application name followed by user name.
pub fn instance_identifier(unique_name: &str, user_name: &str) -> String {
    format!("{}{}", unique_name, user_name)
}

/// Build the channel name for an instance identifier.
pub fn channel_name(identifier: &str) -> String {
    format!("{}{}", identifier, RelayConfig::CHANNEL_NAME_SUFFIX)
}

/// Resources held while this process is the first instance.
#[derive(Default)]
struct HeldResources {
    identifier: Option<String>,
    subscription: Option<Subscription>,
    lock: Option<NamedLock>,
}

impl HeldResources {
    fn release(&mut self) {
        self.identifier = None;
        if let Some(mut subscription) = self.subscription.take() {
            subscription.dispose();
        }
        if let Some(mut lock) = self.lock.take() {
            lock.release();
            info!("Released first-instance lock {}", lock.name());
        }
    }
}

fn lock_resources(resources: &Mutex<HeldResources>) -> MutexGuard<'_, HeldResources> {
    resources
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable handle that releases an [`Arbitrator`]'s resources from any thread.
///
/// Meant for shutdown and signal handlers that cannot reach the arbitrator itself.
#[derive(Clone)]
pub struct CleanupHandle {
    resources: Arc<Mutex<HeldResources>>,
}

impl CleanupHandle {
    /// Same as [`Arbitrator::cleanup`].
    pub fn cleanup(&self) {
        lock_resources(&self.resources).release();
    }
}

/// Elects the first instance and relays arguments from later launches to it.
///
/// Owns the named lock and the channel subscription while first. Both are
/// released by [`Arbitrator::cleanup`], by a [`CleanupHandle`], or on drop.
pub struct Arbitrator {
    channel: MessageChannel,
    app_data_dir: Option<PathBuf>,
    user_name: String,
    publish_timeout: Duration,
    codec: Arc<dyn ArgsCodec>,
    handler: Arc<dyn InstanceHandler>,
    primary_args: Option<PrimaryArgs>,
    resources: Arc<Mutex<HeldResources>>,
}

impl Arbitrator {
    /// Create a builder for an arbitrator delivering to `handler`.
    pub fn builder(handler: impl InstanceHandler) -> ArbitratorBuilder {
        ArbitratorBuilder::new(handler)
    }

    /// Create an arbitrator with default settings.
    pub fn new(handler: impl InstanceHandler) -> Result<Self> {
        Self::builder(handler).build()
    }

    /// Try to become the first instance of `unique_name` for the current user.
    ///
    /// Returns [`Role::First`] after taking the lock and opening the channel.
    /// Otherwise captures this process's arguments, forwards them to the first
    /// instance within the publish timeout, and returns [`Role::Subsequent`].
    ///
    /// Must be called within a tokio runtime.
    pub async fn become_first_or_signal(&mut self, unique_name: &str) -> Result<Role> {
        if unique_name.is_empty() {
            return Err(RelayError::Validation {
                field: "unique_name".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let identifier = instance_identifier(unique_name, &self.user_name);
        let channel = channel_name(&identifier);

        if lock_resources(&self.resources).lock.is_some() {
            return Err(RelayError::LockOwnedBySelf { identifier });
        }

        let lock = match NamedLock::try_acquire(self.channel.state_dir(), &identifier)? {
            Some(lock) => lock,
            None => {
                let handoff = self.signal_first_instance(unique_name, &channel).await;
                return Ok(Role::Subsequent { handoff });
            }
        };

        // The lock is dropped (released) if the channel cannot be opened.
        let subscription = self
            .channel
            .subscribe(&channel, self.delivery_handler(&channel))
            .await?;

        info!("First instance for {} (channel {})", identifier, channel);

        let mut resources = lock_resources(&self.resources);
        resources.identifier = Some(identifier);
        resources.subscription = Some(subscription);
        resources.lock = Some(lock);
        Ok(Role::First)
    }

    /// Release the subscription and the lock, if held.
    ///
    /// Idempotent, and safe to call when `become_first_or_signal` never ran.
    pub fn cleanup(&self) {
        lock_resources(&self.resources).release();
    }

    /// Handle for calling [`Arbitrator::cleanup`] from another thread.
    pub fn cleanup_handle(&self) -> CleanupHandle {
        CleanupHandle {
            resources: self.resources.clone(),
        }
    }

    /// Whether this arbitrator currently holds the first-instance lock.
    pub fn is_first(&self) -> bool {
        lock_resources(&self.resources)
            .lock
            .as_ref()
            .is_some_and(NamedLock::is_held)
    }

    /// Identifier of the held instance, while first.
    pub fn instance_identifier(&self) -> Option<String> {
        lock_resources(&self.resources).identifier.clone()
    }

    /// Name of the subscribed channel, while first.
    pub fn channel_name(&self) -> Option<String> {
        self.instance_identifier().as_deref().map(channel_name)
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn state_dir(&self) -> &Path {
        self.channel.state_dir()
    }

    pub fn publish_timeout(&self) -> Duration {
        self.publish_timeout
    }

    fn argument_source(&self, unique_name: &str) -> ArgumentSource {
        let mut source = ArgumentSource::new(unique_name);
        if let Some(primary) = &self.primary_args {
            let primary = primary.clone();
            source = source.with_primary(move || primary());
        }
        if let Some(dir) = &self.app_data_dir {
            source = source.with_app_data_dir(dir);
        }
        source
    }

    fn delivery_handler(&self, channel: &str) -> impl Fn(Vec<u8>) + Send + Sync + 'static {
        let codec = self.codec.clone();
        let handler = self.handler.clone();
        let channel = channel.to_string();
        move |payload: Vec<u8>| match codec.decode(&payload) {
            Ok(args) => handler.on_invoked(args),
            Err(e) => warn!("Dropping undecodable message on {}: {}", channel, e),
        }
    }

    async fn signal_first_instance(&self, unique_name: &str, channel: &str) -> Result<()> {
        let args = self.argument_source(unique_name).current_args();
        info!(
            "Another instance of {} is running, forwarding {} argument(s)",
            unique_name,
            args.len()
        );

        let outcome = match self.codec.encode(&args) {
            Ok(payload) => {
                self.channel
                    .publish_with_timeout(channel, &payload, self.publish_timeout)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            warn!("Failed to forward arguments to first instance: {}", e);
        }
        outcome
    }
}

impl Drop for Arbitrator {
    fn drop(&mut self) {
        self.cleanup();
    }
}
