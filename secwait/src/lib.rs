//! Secwait library - command line access to the SecHub wait and assertion protocol
//!
//! The binary is a thin wrapper: parse [`cli::Cli`], build a client from the
//! environment and hand both to [`commands::execute`].
pub mod cli;
pub mod commands;
pub mod error;

// Re-export commonly used types
pub use error::{Result, WaitError};
