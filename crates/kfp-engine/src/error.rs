//! Engine errors
//!
//! Anything here aborts the reconcile pass and is retried by the controller.
//! Outcomes the state machine understands are reported as status instead.

use thiserror::Error;

use kfp_workflow::WorkflowError;

/// Errors reading workflows or executing commands
#[derive(Debug, Error)]
pub enum EngineError {
    /// Workflow repository failure
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl EngineError {
    /// Optimistic-concurrency conflict on a write
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}
