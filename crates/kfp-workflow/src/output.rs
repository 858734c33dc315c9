//! Provider output protocol
//!
//! A finished workflow reports its result as the `provider-output` parameter
//! of its entrypoint node, a YAML (or JSON) document `{id, providerError}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::argo::{NodeStatus, Outputs, Parameter, Workflow, WorkflowStatus};

/// Output parameter carrying the provider result
pub const PROVIDER_OUTPUT_PARAMETER: &str = "provider-output";

/// Result reported by a provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutput {
    /// Provider-side id, empty after a delete
    #[serde(default)]
    pub id: String,
    /// Logical failure reported by the provider
    #[serde(default)]
    pub provider_error: String,
}

impl ProviderOutput {
    /// Successful output with `id`
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_error: String::new(),
        }
    }
}

/// The workflow output could not be read
#[derive(Debug, Error)]
pub enum OutputError {
    /// No entrypoint node or no outputs on it
    #[error("workflow does not have {0} node")]
    MissingNode(String),

    /// The entrypoint node lacks the parameter
    #[error("workflow {workflow} outputs does not have the key {parameter}")]
    MissingParameter {
        /// Workflow name
        workflow: String,
        /// Requested parameter
        parameter: String,
    },

    /// The parameter is not a valid output document
    #[error("invalid provider output: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Read the provider output of a finished workflow
pub fn provider_output(workflow: &Workflow) -> Result<ProviderOutput, OutputError> {
    let name = workflow.metadata.name.clone().unwrap_or_default();

    let outputs = workflow
        .status
        .as_ref()
        .and_then(|s| s.nodes.get(&name))
        .and_then(|node| node.outputs.as_ref())
        .ok_or_else(|| OutputError::MissingNode(name.clone()))?;

    let value = outputs
        .parameters
        .iter()
        .find(|p| p.name == PROVIDER_OUTPUT_PARAMETER)
        .and_then(|p| p.value.as_deref())
        .ok_or_else(|| OutputError::MissingParameter {
            workflow: name.clone(),
            parameter: PROVIDER_OUTPUT_PARAMETER.to_string(),
        })?;

    Ok(serde_yaml::from_str(value)?)
}

/// Attach `output` to the entrypoint node of `workflow`
///
/// Mirrors what the workflow templates write on completion.
pub fn set_provider_output(workflow: &mut Workflow, output: &ProviderOutput) {
    let name = workflow.metadata.name.clone().unwrap_or_default();
    // serializing two strings cannot fail
    let value = serde_json::to_string(output).unwrap_or_default();

    let status = workflow.status.get_or_insert_with(WorkflowStatus::default);
    status.nodes.insert(
        name,
        NodeStatus {
            outputs: Some(Outputs {
                parameters: vec![Parameter::new(PROVIDER_OUTPUT_PARAMETER, value)],
            }),
        },
    );
}
