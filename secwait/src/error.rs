//! Error types for the secwait application
use sechub_testkit::{PollError, SecHubError};

/// Exit code when the expected state was not reached
pub const EXIT_EXPECTATION_FAILED: i32 = 1;
/// Exit code for configuration, input and transport problems
pub const EXIT_USAGE: i32 = 2;

/// Custom error type for secwait operations
#[derive(thiserror::Error, Debug)]
pub enum WaitError {
    /// SecHub or PDS API error outside of a wait
    #[error("SecHub API error: {0}")]
    Api(#[from] SecHubError),

    /// A wait or assertion failed
    #[error("{0}")]
    Wait(#[from] PollError),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WaitError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WaitError::Wait(
                PollError::TerminalFailure { .. }
                | PollError::Timeout { .. }
                | PollError::StructuralMismatch { .. }
                | PollError::Precondition(_),
            ) => EXIT_EXPECTATION_FAILED,
            WaitError::Wait(PollError::Fetch(_))
            | WaitError::Api(_)
            | WaitError::Io(_)
            | WaitError::Json(_) => EXIT_USAGE,
        }
    }
}

/// Result type alias for secwait operations
pub type Result<T> = std::result::Result<T, WaitError>;
