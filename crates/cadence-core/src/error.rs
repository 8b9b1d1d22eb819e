//! Error types for cadence workers.
//! Structured, serializable errors so faults can be stored, logged and reported as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result type returned by a periodic payload.
pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Main error type for worker operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerError {
    /// The worker cannot be built from the given settings
    InvalidConfiguration {
        field: String,
        source: String,
    },
    /// The operation is not allowed in the worker's current state
    InvalidOperation {
        operation: String,
        reason: String,
    },
    /// The work callback returned an error or panicked
    WorkerFault {
        /// Sequence number of the invocation that failed
        fire: u64,
        source: String,
    },
}

impl WorkerError {
    pub fn invalid_configuration(field: &str, source: impl Into<String>) -> Self {
        WorkerError::InvalidConfiguration {
            field: field.to_string(),
            source: source.into(),
        }
    }

    pub fn invalid_operation(operation: &str, reason: impl Into<String>) -> Self {
        WorkerError::InvalidOperation {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub fn fault(fire: u64, source: impl Into<String>) -> Self {
        WorkerError::WorkerFault {
            fire,
            source: source.into(),
        }
    }

    /// True for faults raised by the payload, as opposed to misuse of the worker.
    pub fn is_fault(&self) -> bool {
        matches!(self, WorkerError::WorkerFault { .. })
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::InvalidConfiguration { field, source } => {
                write!(f, "Invalid configuration for {}: {}", field, source)
            }
            WorkerError::InvalidOperation { operation, reason } => {
                write!(f, "Invalid operation {}: {}", operation, reason)
            }
            WorkerError::WorkerFault { fire, source } => {
                write!(f, "Work callback failed on run #{}: {}", fire, source)
            }
        }
    }
}

impl std::error::Error for WorkerError {}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
