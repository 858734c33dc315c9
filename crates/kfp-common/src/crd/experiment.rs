//! Experiment CRD

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::Status;
use super::types::NamespacedName;
use crate::hash::ObjectHasher;
use crate::resource::{Resource, ResourceKind};

/// Experiment that groups runs on a provider
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pipelines.kubeflow.org",
    version = "v1beta1",
    kind = "Experiment",
    namespaced,
    status = "Status",
    shortname = "mlexp",
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider.name"}"#,
    printcolumn = r#"{"name":"SynchronizationState","type":"string","jsonPath":".status.conditions[?(@.type==\"Synchronized\")].reason"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSpec {
    /// Provider to create the experiment in
    #[serde(default)]
    pub provider: NamespacedName,

    /// Free-text description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Resource for Experiment {
    const KIND: ResourceKind = ResourceKind::Experiment;

    fn sync_status(&self) -> Status {
        self.status.clone().unwrap_or_default()
    }

    fn set_sync_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    fn compute_version(&self) -> String {
        let mut hasher = ObjectHasher::new();
        hasher.write_string_field(&self.spec.description);
        hasher.version()
    }

    fn spec_provider(&self) -> Option<&NamespacedName> {
        Some(&self.spec.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_changes_version() {
        let a = Experiment::new("nightly", ExperimentSpec::default());
        let mut b = a.clone();
        b.spec.description = "nightly training".to_string();
        assert_ne!(a.compute_version(), b.compute_version());
    }

    #[test]
    fn provider_does_not_change_version() {
        let a = Experiment::new("nightly", ExperimentSpec::default());
        let mut b = a.clone();
        b.spec.provider = NamespacedName::new("ops", "vertex");
        assert_eq!(a.compute_version(), b.compute_version());
    }
}
