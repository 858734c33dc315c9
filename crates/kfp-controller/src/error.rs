//! Reconcile errors
//!
//! Returned errors are retried by the controller runtime through
//! [`error_policy`](crate::reconciler::error_policy). Outcomes a user can act
//! on are written to status instead.

use thiserror::Error;

use kfp_engine::EngineError;

/// Errors that abort a reconcile pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// State machine or command execution failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A provider reference that does not parse
    #[error("invalid provider reference: {0}")]
    InvalidProvider(String),

    /// The controller configuration cannot serve this resource
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Optimistic-concurrency conflict on a write
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Kube(kube::Error::Api(ae)) => ae.code == 409,
            Self::Engine(e) => e.is_conflict(),
            _ => false,
        }
    }
}
