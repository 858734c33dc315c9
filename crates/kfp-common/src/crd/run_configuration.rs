//! RunConfiguration CRD
//!
//! A RunConfiguration is a run template plus the triggers that instantiate
//! it. It owns one RunSchedule per schedule trigger and one Run per fired
//! change trigger; it never talks to a provider directly.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::run::{Dependencies, RunReference, RunSpec};
use super::run_schedule::Schedule;
use super::status::Status;
use super::types::NamespacedName;
use crate::hash::ObjectHasher;
use crate::resource::{Resource, ResourceKind};

/// Change that fires a new Run
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum OnChangeType {
    /// The referenced pipeline's version changed
    Pipeline,
    /// The run spec changed
    RunSpec,
}

impl OnChangeType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::RunSpec => "runSpec",
        }
    }
}

/// Everything that instantiates the run template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Triggers {
    /// One RunSchedule per entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedules: Vec<Schedule>,

    /// Changes that fire a Run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_change: Vec<OnChangeType>,

    /// RunConfigurations whose successful runs fire a Run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_configurations: Vec<NamespacedName>,
}

/// Run template with triggers
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pipelines.kubeflow.org",
    version = "v1beta1",
    kind = "RunConfiguration",
    namespaced,
    status = "RunConfigurationStatus",
    shortname = "mlrc",
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider.name"}"#,
    printcolumn = r#"{"name":"SynchronizationState","type":"string","jsonPath":".status.conditions[?(@.type==\"Synchronized\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RunConfigurationSpec {
    /// Template for triggered runs and schedules
    #[serde(default)]
    pub run: RunSpec,

    /// What instantiates the template
    #[serde(default)]
    pub triggers: Triggers,
}

/// Latest runs by outcome
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LatestRuns {
    /// Latest succeeded run, written by the run-completion feed
    #[serde(default)]
    pub succeeded: RunReference,
}

/// Triggering RunConfiguration as last seen
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredRunReference {
    /// Provider id of its latest succeeded run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider_id: String,
}

/// Version that last fired a trigger
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct TriggeredVersion {
    /// Version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// What the triggers last fired on
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TriggersStatus {
    /// Triggering RunConfigurations keyed by reference as written
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub run_configurations: BTreeMap<String, TriggeredRunReference>,

    /// Run spec version
    #[serde(default)]
    pub run_spec: TriggeredVersion,

    /// Pipeline version
    #[serde(default)]
    pub pipeline: TriggeredVersion,
}

/// RunConfiguration status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunConfigurationStatus {
    /// Synchronization status aggregated from owned schedules
    #[serde(flatten)]
    pub base: Status,

    /// Latest runs
    #[serde(default)]
    pub latest_runs: LatestRuns,

    /// Observed dependencies
    #[serde(default)]
    pub dependencies: Dependencies,

    /// Trigger bookkeeping
    #[serde(default)]
    pub triggers: TriggersStatus,
}

impl RunConfiguration {
    /// Full status, defaulted when unset
    pub fn rc_status(&self) -> RunConfigurationStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Mutable status, created when unset
    pub fn rc_status_mut(&mut self) -> &mut RunConfigurationStatus {
        self.status.get_or_insert_with(RunConfigurationStatus::default)
    }

    /// Pipeline version last observed
    pub fn observed_pipeline_version(&self) -> String {
        self.status
            .as_ref()
            .map(|s| s.dependencies.pipeline.version.clone())
            .unwrap_or_default()
    }

    /// RunConfigurations referenced by parameters and triggers, deduplicated,
    /// parameter references first
    pub fn referenced_run_configurations(&self) -> Vec<NamespacedName> {
        let mut referenced: Vec<NamespacedName> = Vec::new();
        let candidates = self
            .spec
            .run
            .referenced_artifacts()
            .map(|r| &r.name)
            .chain(self.spec.triggers.run_configurations.iter());
        for name in candidates {
            if !referenced.contains(name) {
                referenced.push(name.clone());
            }
        }
        referenced
    }

    /// Whether an `onChange` trigger of this type is configured
    pub fn triggers_on(&self, change: OnChangeType) -> bool {
        self.spec.triggers.on_change.contains(&change)
    }
}

impl Resource for RunConfiguration {
    const KIND: ResourceKind = ResourceKind::RunConfiguration;

    fn sync_status(&self) -> Status {
        self.status.as_ref().map(|s| s.base.clone()).unwrap_or_default()
    }

    fn set_sync_status(&mut self, status: Status) {
        self.rc_status_mut().base = status;
    }

    fn compute_version(&self) -> String {
        let mut hasher = ObjectHasher::new();
        self.spec.run.write_to(&mut hasher);

        let triggers = &self.spec.triggers;
        hasher.write_list(
            &triggers.schedules,
            |a, b| {
                (&a.cron_expression, a.start_time, a.end_time).cmp(&(
                    &b.cron_expression,
                    b.start_time,
                    b.end_time,
                ))
            },
            |h, s| {
                h.write_string_field(&s.cron_expression);
                if let Some(start) = &s.start_time {
                    h.write_string_field(&start.to_rfc3339());
                }
                if let Some(end) = &s.end_time {
                    h.write_string_field(&end.to_rfc3339());
                }
            },
        );
        hasher.write_list(&triggers.on_change, Ord::cmp, |h, c| {
            h.write_string_field(c.as_str())
        });
        hasher.write_list(
            &triggers.run_configurations,
            |a, b| a.to_string().cmp(&b.to_string()),
            |h, rc| h.write_string_field(&rc.to_string()),
        );
        hasher.version()
    }

    fn spec_provider(&self) -> Option<&NamespacedName> {
        Some(&self.spec.run.provider)
    }
}
