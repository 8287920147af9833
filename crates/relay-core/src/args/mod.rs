//! Argument capture for handoff to the first instance.
//!
//! - `source` - Reads the process argv, or the launcher's fallback file
//! - `cmdline` - Decodes and splits raw command-line text

pub mod cmdline;
pub mod source;

pub use cmdline::{decode_cmdline_text, split_command_line};
pub use source::{current_args, ArgumentSource, PrimaryArgs};
