//! Platform abstraction layer for cross-platform compatibility.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module rather than
//! scattered throughout the codebase.
//!
//! # Architecture
//!
//! - `paths` - Per-user directories and derived file names
//! - `user` - Current OS user identity
//!
//! # Supported Platforms
//!
//! - **Linux**: Full support
//! - **Windows**: Full support
//! - **macOS**: Full support

pub mod paths;
pub mod user;

pub use paths::{cmdline_file_path, derived_file_stem, local_app_data_dir, state_dir};
pub use user::current_user_name;
#[cfg(unix)]
pub use user::current_uid;
