//! Run CRD and the run spec shared with RunConfiguration

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::status::Status;
use super::types::{Artifact, NamedValue, NamespacedName, OutputArtifact};
use crate::hash::{short_hex, ObjectHasher};
use crate::resource::{Resource, ResourceKind};

// =============================================================================
// PipelineIdentifier
// =============================================================================

/// Pipeline reference, serialized as `name` or `name:version`
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineIdentifier {
    /// Pipeline name in the referencing resource's namespace
    pub name: String,
    /// Pinned version, empty to follow the pipeline's current version
    pub version: String,
}

impl PipelineIdentifier {
    /// Unpinned reference
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
        }
    }

    /// Reference pinned to `version`
    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PipelineIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.version)
        }
    }
}

impl FromStr for PipelineIdentifier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default().to_string();
        let version = match (parts.next(), parts.next()) {
            (Some(version), None) => version.to_string(),
            _ => String::new(),
        };
        Ok(Self { name, version })
    }
}

impl Serialize for PipelineIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PipelineIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for PipelineIdentifier {
    fn schema_name() -> String {
        "PipelineIdentifier".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Output artifact of another RunConfiguration's latest successful run
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunConfigurationRef {
    /// RunConfiguration to read from
    pub name: NamespacedName,
    /// Artifact name in its latest succeeded run
    pub output_artifact: String,
    /// Drop the parameter instead of failing when the artifact is missing
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

/// Indirect parameter value
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValueFrom {
    /// Artifact reference
    pub run_configuration_ref: RunConfigurationRef,
}

/// Run parameter, either literal or taken from a dependency
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Literal value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Indirect value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
}

impl Parameter {
    /// Literal parameter
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            value_from: None,
        }
    }

    /// Parameter taken from a RunConfiguration output artifact
    pub fn from_run_configuration(
        name: impl Into<String>,
        run_configuration: NamespacedName,
        output_artifact: impl Into<String>,
        optional: bool,
    ) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            value_from: Some(ValueFrom {
                run_configuration_ref: RunConfigurationRef {
                    name: run_configuration,
                    output_artifact: output_artifact.into(),
                    optional,
                },
            }),
        }
    }

    fn sort_key(&self) -> (&str, &str, Option<(&str, &str, &str, bool)>) {
        (
            &self.name,
            &self.value,
            self.value_from.as_ref().map(|vf| {
                let r = &vf.run_configuration_ref;
                // required sorts before optional
                (
                    r.name.name.as_str(),
                    r.name.namespace.as_str(),
                    r.output_artifact.as_str(),
                    r.optional,
                )
            }),
        )
    }
}

/// A parameter that cannot be resolved yet
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    /// The dependency exists but its latest run lacks the artifact
    #[error("artifact '{artifact}' not found in dependency '{dependency}'")]
    ArtifactNotFound {
        /// Requested artifact
        artifact: String,
        /// Dependency it was requested from
        dependency: String,
    },

    /// The dependency has not been observed
    #[error("dependency '{dependency}' not found")]
    DependencyNotFound {
        /// Missing dependency
        dependency: String,
    },
}

// =============================================================================
// RunSpec
// =============================================================================

/// What to run and with which inputs
///
/// Also embedded in RunConfiguration as the template for triggered runs.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pipelines.kubeflow.org",
    version = "v1beta1",
    kind = "Run",
    namespaced,
    status = "RunStatus",
    shortname = "mlr",
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider.name"}"#,
    printcolumn = r#"{"name":"SynchronizationState","type":"string","jsonPath":".status.conditions[?(@.type==\"Synchronized\")].reason"}"#,
    printcolumn = r#"{"name":"CompletionState","type":"string","jsonPath":".status.completionState"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    /// Provider to submit to
    #[serde(default)]
    pub provider: NamespacedName,

    /// Pipeline to run
    #[serde(default)]
    pub pipeline: PipelineIdentifier,

    /// Experiment to run under; defaults to the controller's default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub experiment_name: String,

    /// Runtime parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    /// Artifacts published on completion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<OutputArtifact>,
}

impl RunSpec {
    /// Write every spec field except the provider
    pub fn write_to(&self, hasher: &mut ObjectHasher) {
        hasher.write_string_field(&self.pipeline.to_string());
        hasher.write_string_field(&self.experiment_name);
        hasher.write_list(
            &self.parameters,
            |a, b| a.sort_key().cmp(&b.sort_key()),
            |h, p| {
                h.write_string_field(&p.name);
                h.write_string_field(&p.value);
                if let Some(vf) = &p.value_from {
                    let r = &vf.run_configuration_ref;
                    h.write_string_field(&r.name.name);
                    h.write_string_field(&r.name.namespace);
                    h.write_string_field(&r.output_artifact);
                    h.write_string_field(&r.optional.to_string());
                }
            },
        );
        hasher.write_kv_list_field(&self.artifacts);
    }

    /// Version of the run spec alone
    pub fn compute_version(&self) -> String {
        let mut hasher = ObjectHasher::new();
        self.write_to(&mut hasher);
        hasher.version()
    }

    /// RunConfigurations referenced by parameters
    pub fn referenced_artifacts(&self) -> impl Iterator<Item = &RunConfigurationRef> {
        self.parameters
            .iter()
            .filter_map(|p| p.value_from.as_ref().map(|vf| &vf.run_configuration_ref))
    }

    /// Resolve parameters against observed dependencies
    ///
    /// Returns the resolved values and the optional parameters that were
    /// dropped because their artifact is missing.
    pub fn resolve_parameters(
        &self,
        dependencies: &Dependencies,
    ) -> Result<(Vec<NamedValue>, Vec<Parameter>), ParameterError> {
        let mut resolved = Vec::with_capacity(self.parameters.len());
        let mut dropped = Vec::new();

        for parameter in &self.parameters {
            let Some(value_from) = &parameter.value_from else {
                resolved.push(NamedValue::new(&parameter.name, &parameter.value));
                continue;
            };

            let reference = &value_from.run_configuration_ref;
            let dependency = reference.name.to_string();
            let Some(run) = dependencies.run_configurations.get(&dependency) else {
                return Err(ParameterError::DependencyNotFound { dependency });
            };

            match run
                .artifacts
                .iter()
                .find(|a| a.name == reference.output_artifact)
            {
                Some(artifact) => {
                    resolved.push(NamedValue::new(&parameter.name, &artifact.location))
                }
                None if reference.optional => dropped.push(parameter.clone()),
                None => {
                    return Err(ParameterError::ArtifactNotFound {
                        artifact: reference.output_artifact.clone(),
                        dependency,
                    })
                }
            }
        }

        Ok((resolved, dropped))
    }
}

// =============================================================================
// Dependencies and status
// =============================================================================

/// A completed run as seen by dependants
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunReference {
    /// Provider id of the run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider_id: String,
    /// Artifacts it produced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

/// Pipeline version a resource was last reconciled against
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ObservedPipeline {
    /// Observed version, empty when the pipeline is absent
    #[serde(default)]
    pub version: String,
}

/// Observed state of everything a run depends on
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dependencies {
    /// Referenced RunConfigurations keyed by reference as written
    #[serde(default)]
    pub run_configurations: BTreeMap<String, RunReference>,
    /// Referenced pipeline
    #[serde(default)]
    pub pipeline: ObservedPipeline,
}

/// Final outcome of a run on the provider
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum CompletionState {
    /// Run succeeded
    Succeeded,
    /// Run failed
    Failed,
}

/// Run status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    /// Synchronization status
    #[serde(flatten)]
    pub base: Status,

    /// Observed dependencies
    #[serde(default)]
    pub dependencies: Dependencies,

    /// Set by the run-completion feed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_state: Option<CompletionState>,

    /// When the completion was first observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Run
// =============================================================================

impl Run {
    /// Full run status, defaulted when unset
    pub fn run_status(&self) -> RunStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Mutable run status, created when unset
    pub fn run_status_mut(&mut self) -> &mut RunStatus {
        self.status.get_or_insert_with(RunStatus::default)
    }

    /// Pipeline version last observed for this run
    pub fn observed_pipeline_version(&self) -> String {
        self.status
            .as_ref()
            .map(|s| s.dependencies.pipeline.version.clone())
            .unwrap_or_default()
    }

    /// Observed RunConfiguration dependencies
    pub fn dependencies(&self) -> Dependencies {
        self.status
            .as_ref()
            .map(|s| s.dependencies.clone())
            .unwrap_or_default()
    }

    /// Full digest of spec and observed pipeline version
    pub fn compute_hash(&self) -> Vec<u8> {
        let mut hasher = ObjectHasher::new();
        self.spec.write_to(&mut hasher);
        hasher.write_string_field(&self.observed_pipeline_version());
        hasher.sum()
    }
}

impl Resource for Run {
    const KIND: ResourceKind = ResourceKind::Run;

    fn sync_status(&self) -> Status {
        self.status.as_ref().map(|s| s.base.clone()).unwrap_or_default()
    }

    fn set_sync_status(&mut self, status: Status) {
        self.run_status_mut().base = status;
    }

    fn compute_version(&self) -> String {
        short_hex(&self.compute_hash())
    }

    fn spec_provider(&self) -> Option<&NamespacedName> {
        Some(&self.spec.provider)
    }
}
