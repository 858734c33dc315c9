//! Workflow errors

use thiserror::Error;

use crate::labels::LabelError;
use crate::output::OutputError;

/// A resource definition the provider cannot be asked to handle
///
/// Its message is shown to users as the failure reason.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct WorkflowParameterError(pub String);

/// Errors building, reading or storing workflows
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The resource cannot be expressed as a workflow for this provider
    #[error(transparent)]
    Parameter(#[from] WorkflowParameterError),

    /// The provider does not serve the resource's namespace
    #[error("resource {name} in namespace {namespace} is not allowed by provider {provider}")]
    NamespaceNotAllowed {
        /// Resource name
        name: String,
        /// Resource namespace
        namespace: String,
        /// Provider name
        provider: String,
    },

    /// The resource definition could not be built
    #[error("definition error: {0}")]
    Definition(String),

    /// A provider framework patch could not be applied
    #[error("patch error: {0}")]
    Patch(String),

    /// Workflow labels could not be interpreted
    #[error(transparent)]
    Label(#[from] LabelError),

    /// Workflow output could not be read
    #[error(transparent)]
    Output(#[from] OutputError),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl WorkflowError {
    /// Message recorded on the resource when workflow construction fails
    ///
    /// Parameter errors carry a message meant for users; anything else is
    /// reported with a fixed message and logged in full.
    pub fn failure_message(&self) -> String {
        match self {
            Self::Parameter(e) => e.to_string(),
            _ => CONSTRUCTION_FAILED.to_string(),
        }
    }
}

/// Failure message for workflow construction errors
pub const CONSTRUCTION_FAILED: &str = "error constructing workflow";

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Definition(e.to_string())
    }
}
