use std::time::Duration;
use thiserror::Error;

use crate::database::manager::DatabaseError;
use crate::database::models::HotspotValidationError;

/// Failure modes of one orchestration attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("No AP-capable wireless interface available (checked: {checked:?})")]
    NoInterfaceAvailable { checked: Vec<String> },

    #[error("Config generation failed: {0}")]
    ConfigGenerationFailed(String),

    #[error("Insufficient privilege: {0}")]
    InsufficientPrivilege(String),

    #[error("Command failed (exit={exit_code:?}): {stderr}")]
    CommandFailed {
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Hotspot state not observed within {}s of verification", .waited.as_secs())]
    VerificationTimeout { waited: Duration },

    #[error("Hotspot {0} not found")]
    HotspotNotFound(i32),

    #[error("Task exceeded hard time limit of {}s", .0.as_secs())]
    TaskTimeLimitExceeded(Duration),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl OrchestrationError {
    /// Stable code carried verbatim in task results and poll responses
    pub fn code(&self) -> &'static str {
        match self {
            OrchestrationError::NoInterfaceAvailable { .. } => "NO_INTERFACE_AVAILABLE",
            OrchestrationError::ConfigGenerationFailed(_) => "CONFIG_GENERATION_FAILED",
            OrchestrationError::InsufficientPrivilege(_) => "INSUFFICIENT_PRIVILEGE",
            OrchestrationError::CommandFailed { .. } => "COMMAND_FAILED",
            OrchestrationError::VerificationTimeout { .. } => "VERIFICATION_TIMEOUT",
            OrchestrationError::HotspotNotFound(_) => "HOTSPOT_NOT_FOUND",
            OrchestrationError::TaskTimeLimitExceeded(_) => "TASK_TIME_LIMIT_EXCEEDED",
            OrchestrationError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Everything except a vanished hotspot is worth another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OrchestrationError::HotspotNotFound(_))
    }

    pub fn config(err: impl std::fmt::Display) -> Self {
        OrchestrationError::ConfigGenerationFailed(err.to_string())
    }
}

impl From<DatabaseError> for OrchestrationError {
    fn from(err: DatabaseError) -> Self {
        OrchestrationError::Storage(err.to_string())
    }
}

impl From<HotspotValidationError> for OrchestrationError {
    fn from(err: HotspotValidationError) -> Self {
        OrchestrationError::ConfigGenerationFailed(err.to_string())
    }
}
