//! Argo Workflow types
//!
//! Only the fields the operator reads or writes are modelled. Everything
//! else on a live workflow is ignored on read and never sent back, since
//! every write is either a create of our own object or a metadata patch.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Workflow submitted against a WorkflowTemplate
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Workflow",
    namespaced,
    status = "WorkflowStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Input parameters
    #[serde(default)]
    pub arguments: Arguments,

    /// Template to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_template_ref: Option<WorkflowTemplateRef>,
}

/// Workflow arguments
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Arguments {
    /// Named string parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

/// Named workflow parameter
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Parameter {
    /// Parameter with a value
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// Reference to a WorkflowTemplate in the workflow's namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct WorkflowTemplateRef {
    /// Template name
    pub name: String,
}

/// Workflow phase as reported by Argo
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum WorkflowPhase {
    /// Accepted, not yet running
    Pending,
    /// Running
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished unsuccessfully
    Failed,
    /// Could not be run
    Error,
    /// Anything this operator does not know about
    #[serde(other)]
    Unknown,
}

/// Workflow status
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct WorkflowStatus {
    /// Current phase; unset until the workflow controller picks it up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<WorkflowPhase>,

    /// Node statuses keyed by node id; the entrypoint node id is the
    /// workflow name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nodes: BTreeMap<String, NodeStatus>,
}

/// Status of a single workflow node
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NodeStatus {
    /// Node outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
}

/// Node outputs
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Outputs {
    /// Output parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Workflow {
    /// Phase, `None` while the workflow has not been picked up
    pub fn phase(&self) -> Option<WorkflowPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// Value of an input parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.spec
            .arguments
            .parameters
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_phases_deserialize() {
        let status: WorkflowStatus = serde_json::from_str(r#"{"phase":"Skipped"}"#).unwrap();
        assert_eq!(status.phase, Some(WorkflowPhase::Unknown));
    }

    #[test]
    fn live_workflows_parse_with_extra_fields() {
        let workflow: Workflow = serde_json::from_value(serde_json::json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Workflow",
            "metadata": {"name": "pipeline-penguin-x7k2p", "namespace": "kfp-operator-system"},
            "spec": {
                "arguments": {"parameters": [{"name": "resource-kind", "value": "pipeline"}]},
                "workflowTemplateRef": {"name": "kfp-operator-create-compiled"},
                "serviceAccountName": "kfp-operator-argo"
            },
            "status": {
                "phase": "Succeeded",
                "startedAt": "2026-01-01T00:00:00Z",
                "nodes": {"pipeline-penguin-x7k2p": {"outputs": {"parameters": []}}}
            }
        }))
        .unwrap();

        assert_eq!(workflow.phase(), Some(WorkflowPhase::Succeeded));
        assert_eq!(workflow.parameter("resource-kind"), Some("pipeline"));
        assert_eq!(workflow.parameter("resource-id"), None);
    }
}
