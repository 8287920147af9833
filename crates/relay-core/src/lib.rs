//! Instance Relay - single-instance arbitration with argument forwarding.
//!
//! When an application is launched several times, only the first process keeps
//! running. Later launches detect it, forward their command-line arguments to it
//! over a local named channel, and exit.
//!
//! # Example
//!
//! ```rust,ignore
//! use instance_relay::{Arbitrator, Role};
//!
//! #[tokio::main]
//! async fn main() -> instance_relay::Result<()> {
//!     let mut arbitrator = Arbitrator::new(|args: Vec<String>| {
//!         println!("Another launch asked to open {:?}", args);
//!     })?;
//!
//!     if let Role::Subsequent { handoff } = arbitrator.become_first_or_signal("com.example.viewer").await? {
//!         std::process::exit(handoff.map_or_else(|e| e.exit_code(), |_| 0));
//!     }
//!
//!     // First instance: run the application. Dropping the arbitrator
//!     // releases the lock and closes the channel.
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`arbitrator`] - Lock election and the first/subsequent decision
//! - [`channel`] - Named local publish/subscribe transport
//! - [`args`] - Argument capture, including the launcher fallback file
//! - [`codec`] - Argument payload encoding
//! - [`lock`] - System-wide named lock

pub mod arbitrator;
pub mod args;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod lock;
pub mod platform;

// Re-export commonly used types
pub use arbitrator::{
    channel_name, instance_identifier, Arbitrator, ArbitratorBuilder, CleanupHandle,
    InstanceHandler, Role,
};
pub use args::{current_args, split_command_line, ArgumentSource};
pub use channel::{MessageChannel, MessageHandler, Subscription};
pub use codec::{ArgsCodec, JsonArgsCodec};
pub use error::{RelayError, Result};
pub use lock::NamedLock;
