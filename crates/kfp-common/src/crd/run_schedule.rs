//! RunSchedule CRD
//!
//! RunSchedules are owned by RunConfigurations, one per schedule trigger.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::run::PipelineIdentifier;
use super::status::Status;
use super::types::{NamedValue, NamespacedName, OutputArtifact};
use crate::hash::ObjectHasher;
use crate::resource::{Resource, ResourceKind};

/// Cron schedule with an optional active window
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Cron expression
    #[serde(default)]
    pub cron_expression: String,
    /// No runs before this time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// No runs after this time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Nothing set
    pub fn is_empty(&self) -> bool {
        self.cron_expression.is_empty() && self.start_time.is_none() && self.end_time.is_none()
    }
}

/// Recurring run on a provider
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pipelines.kubeflow.org",
    version = "v1beta1",
    kind = "RunSchedule",
    namespaced,
    status = "Status",
    shortname = "mlrs",
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider.name"}"#,
    printcolumn = r#"{"name":"SynchronizationState","type":"string","jsonPath":".status.conditions[?(@.type==\"Synchronized\")].reason"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RunScheduleSpec {
    /// Provider to schedule on
    #[serde(default)]
    pub provider: NamespacedName,

    /// Pipeline to run, pinned by the owning RunConfiguration
    #[serde(default)]
    pub pipeline: PipelineIdentifier,

    /// Experiment to run under
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub experiment_name: String,

    /// Resolved runtime parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<NamedValue>,

    /// Artifacts published on completion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<OutputArtifact>,

    /// When to run
    #[serde(default)]
    pub schedule: Schedule,
}

impl Resource for RunSchedule {
    const KIND: ResourceKind = ResourceKind::RunSchedule;

    fn sync_status(&self) -> Status {
        self.status.clone().unwrap_or_default()
    }

    fn set_sync_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    fn compute_version(&self) -> String {
        let mut hasher = ObjectHasher::new();
        hasher.write_string_field(&self.spec.pipeline.to_string());
        hasher.write_string_field(&self.spec.experiment_name);
        hasher.write_kv_list_field(&self.spec.parameters);
        hasher.write_kv_list_field(&self.spec.artifacts);
        hasher.write_string_field(&self.spec.schedule.cron_expression);
        if let Some(start) = &self.spec.schedule.start_time {
            hasher.write_string_field(&start.to_rfc3339());
        }
        if let Some(end) = &self.spec.schedule.end_time {
            hasher.write_string_field(&end.to_rfc3339());
        }
        hasher.version()
    }

    fn spec_provider(&self) -> Option<&NamespacedName> {
        Some(&self.spec.provider)
    }
}
