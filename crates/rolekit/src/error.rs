//! Error types for role execution.
//!
//! Errors are categorized so the transport layer can decide what to retry
//! and roles can decide what aborts a run. Nothing in the core swallows an
//! error: a failed probe is reported as a failure, never as "not installed".

use crate::role::RoleState;
use thiserror::Error;

/// Categories of errors, used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The command could not be dispatched (connection refused, ssh failure)
    Transport,
    /// The command ran and exited with a failure status
    Execution,
    /// A remote path that was expected to exist does not
    NotFound,
    /// Remote content did not match the expected format
    Parse,
    /// Misuse of the framework (lifecycle, registry, missing context keys)
    Usage,
    /// Local I/O
    Io,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => "Could not reach the target host",
            Self::Execution => "Remote command failed",
            Self::NotFound => "Remote path not found",
            Self::Parse => "Unexpected remote content",
            Self::Usage => "Invalid use of a role",
            Self::Io => "Local I/O failure",
        }
    }
}

/// Errors raised while provisioning.
#[derive(Debug, Error)]
pub enum Error {
    /// The command could not be dispatched or the connection failed
    #[error("transport error: {message}")]
    Transport {
        /// What went wrong while reaching the host
        message: String,
    },

    /// The remote command ran but exited non-zero
    #[error("command `{command}` failed{}: {stderr}", status_suffix(.status))]
    Execution {
        /// The command as sent to the host
        command: String,
        /// Exit status, if the process exited normally
        status: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// A read was attempted against a path that does not exist
    #[error("remote path not found: {path}")]
    NotFound {
        /// The missing remote path
        path: String,
    },

    /// A timestamp record did not match the expected format
    #[error("invalid timestamp {content:?} in {path}: {source}")]
    Parse {
        /// Remote file the content was read from
        path: String,
        /// The offending content
        content: String,
        /// Underlying parse failure
        source: chrono::ParseError,
    },

    /// The role instance is already borrowed further up the call stack
    #[error("role {0} is already in use")]
    CapabilityInUse(&'static str),

    /// A second instance of a role type was registered in the same context
    #[error("role {0} is already registered in this context")]
    CapabilityConflict(&'static str),

    /// A lifecycle step was invoked out of order
    #[error("role {role} cannot go from {from:?} to {to:?}")]
    Lifecycle {
        /// Role name
        role: &'static str,
        /// Current state
        from: RoleState,
        /// Requested state
        to: RoleState,
    },

    /// A context key a role depends on was never set
    #[error("context value `{0}` is missing")]
    MissingContextValue(&'static str),

    /// The context has already been cleaned up
    #[error("run context is already cleaned up")]
    ContextClosed,

    /// Local I/O error (spawning processes, reading files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transport { .. } => ErrorCategory::Transport,
            Error::Execution { .. } => ErrorCategory::Execution,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Parse { .. } => ErrorCategory::Parse,
            Error::Io(_) => ErrorCategory::Io,
            _ => ErrorCategory::Usage,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Build an execution error from a failed command.
    pub fn execution(command: &str, status: Option<i32>, stderr: &str) -> Self {
        Error::Execution {
            command: command.to_string(),
            status,
            stderr: stderr.trim().to_string(),
        }
    }

    /// Build a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<i32>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

/// Result type for role operations.
pub type Result<T> = std::result::Result<T, Error>;
