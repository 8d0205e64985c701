//! Error types for omniboot
//!
//! One tagged failure type shared by every stage of the startup pipeline.
//! Detection and remediation problems never surface here: the prober
//! downgrades them to absent capabilities and the healing engine records
//! them as failed actions.

use thiserror::Error;

/// Exit code when a required service never became ready
pub const EXIT_CODE_SERVICE_FAILED: i32 = 2;

/// Exit code when startup was cancelled (Ctrl-C or startup timeout)
pub const EXIT_CODE_CANCELLED: i32 = 130;

/// Main error type for the startup orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// State machine transition errors
    #[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// A required service exhausted its retry budget
    #[error("Service '{service}' did not become ready after {attempts} attempt(s)")]
    ServiceFailed { service: String, attempts: u32 },

    /// Startup was cancelled while a service was coming up
    #[error("Startup cancelled while waiting for service '{service}'")]
    Cancelled { service: String },

    /// Service list violates ordering rules
    #[error("Invalid service graph: {0}")]
    InvalidServiceGraph(String),

    /// Named agent task does not exist
    #[error("Unknown agent task: {0}")]
    UnknownTask(String),

    /// Passthrough command could not be executed
    #[error("Passthrough command failed: {0}")]
    Passthrough(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic errors with context
    #[error("Orchestrator error: {0}")]
    Generic(String),
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Convert anyhow errors to OrchestratorError
impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Generic(err.to_string())
    }
}

impl OrchestratorError {
    /// Process exit code to report for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestratorError::ServiceFailed { .. } => EXIT_CODE_SERVICE_FAILED,
            OrchestratorError::Cancelled { .. } => EXIT_CODE_CANCELLED,
            _ => 1,
        }
    }
}
