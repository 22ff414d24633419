//! Error types for the Bill actor.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use workflow_framework::{FrameworkError, RetryError, Retryable};

/// Errors that can occur during bill operations.
///
/// Serializable so a per-item failure can be written to a run's history and handed
/// back unchanged when an update id is resubmitted.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BillingError {
    /// Bad amount, unknown currency, or a close date that is not in the future.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested bill does not exist.
    #[error("Bill not found: {0}")]
    NotFound(String),

    /// The bill already reached `Closed` and accepts no further items.
    #[error("Bill already closed: {0}")]
    AlreadyClosed(String),

    /// A summary was requested before the bill closed.
    #[error("Bill still open: {0}")]
    StillOpen(String),

    /// I/O or connectivity failure of the persistence collaborator.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Retries were exhausted on transient failures.
    #[error("Terminal failure after {attempts} attempts: {reason}")]
    Terminal { attempts: u32, reason: String },

    /// A run for this bill is already live.
    #[error("Bill run already running: {0}")]
    AlreadyRunning(String),

    /// The bill's run is not accepting requests right now.
    #[error("Bill run unavailable: {0}")]
    Unavailable(String),

    /// Failure of the run itself (history, replay, task).
    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

impl Retryable for BillingError {
    fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Transient(_))
    }
}

impl From<RetryError<BillingError>> for BillingError {
    fn from(error: RetryError<BillingError>) -> Self {
        match error {
            RetryError::NonRetryable { source, .. } => source,
            RetryError::Exhausted { attempts, source } => BillingError::Terminal {
                attempts,
                reason: source.to_string(),
            },
        }
    }
}

impl From<FrameworkError> for BillingError {
    fn from(error: FrameworkError) -> Self {
        match error.downcast_workflow::<BillingError>() {
            Ok(e) => e,
            Err(FrameworkError::RunClosed) => {
                BillingError::Unavailable("run stopped accepting requests".to_string())
            }
            Err(FrameworkError::RunDropped) => {
                BillingError::Unavailable("run dropped the request".to_string())
            }
            Err(FrameworkError::AlreadyRunning(id)) => BillingError::AlreadyRunning(id),
            Err(FrameworkError::NotFound(id)) => BillingError::NotFound(id),
            Err(other) => BillingError::Orchestration(other.to_string()),
        }
    }
}
