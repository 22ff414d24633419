//! # Framework Errors
//!
//! Errors raised by the plumbing between clients and runs, and by history backends.
//! Workflow-specific failures travel inside [`FrameworkError::Workflow`] and can be
//! recovered with [`FrameworkError::downcast_workflow`].

/// Errors that can occur within the workflow framework itself.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("Run closed")]
    RunClosed,
    #[error("Run dropped response channel")]
    RunDropped,
    #[error("Run not found: {0}")]
    NotFound(String),
    #[error("Run already running: {0}")]
    AlreadyRunning(String),
    #[error("History error: {0}")]
    History(String),
    #[error("Workflow error: {0}")]
    Workflow(Box<dyn std::error::Error + Send + Sync>),
}

impl FrameworkError {
    /// Wraps a workflow error for transport back to a client.
    pub fn workflow<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        FrameworkError::Workflow(Box::new(error))
    }

    /// Recovers the concrete workflow error, or gives `self` back unchanged.
    pub fn downcast_workflow<E: std::error::Error + 'static>(self) -> Result<E, Self> {
        match self {
            FrameworkError::Workflow(inner) => match inner.downcast::<E>() {
                Ok(e) => Ok(*e),
                Err(inner) => Err(FrameworkError::Workflow(inner)),
            },
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("closed")]
    struct Closed;

    #[test]
    fn test_downcast_workflow_roundtrips_concrete_error() {
        let err = FrameworkError::workflow(Closed);
        assert_eq!(err.downcast_workflow::<Closed>().unwrap(), Closed);
    }

    #[test]
    fn test_downcast_workflow_leaves_transport_errors_alone() {
        let err = FrameworkError::RunClosed.downcast_workflow::<Closed>();
        assert!(matches!(err, Err(FrameworkError::RunClosed)));
    }
}
