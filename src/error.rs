//! Error handling module for d1flow
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Execution failures of the wrapped commands are NOT errors: they are carried
//! inside `ExecutionResult`. The types here cover the workbench itself.

use thiserror::Error;

/// Main error type for d1flow
#[derive(Error, Debug)]
pub enum WorkbenchError {
    /// IO errors (config files, sockets, stdin)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session gate violations (busy, unknown step, ticket mismatch)
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias for workbench operations
pub type Result<T> = std::result::Result<T, WorkbenchError>;

impl WorkbenchError {
    /// Create a server error
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }
}

/// Reasons the session controller refuses a transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A command is already in flight; single-flight rejects the new one
    #[error("a command is already running")]
    Busy,

    /// Step index outside the generated step list. Indices are zero-based;
    /// messages number steps from 1 as the listings do.
    #[error("unknown step {} (there are {count} steps)", .index + 1)]
    UnknownStep { index: usize, count: usize },

    /// Step prerequisites are not met yet
    #[error("step {} is not ready: {reason}", .index + 1)]
    StepNotReady { index: usize, reason: String },

    /// Completion reported while the session is idle
    #[error("no command is running")]
    NoRunInFlight,

    /// Completion reported for a run other than the one in flight
    #[error("run {got} does not match the run in flight ({expected})")]
    TicketMismatch { expected: u64, got: u64 },

    /// The executor thread has shut down
    #[error("command executor is no longer running")]
    ExecutorGone,
}
