//! Per-kind resource definitions handed to provider workflows
//!
//! Each definition is the JSON document a provider adapter receives as the
//! `resource-definition` parameter.

use std::collections::BTreeMap;

use kfp_common::config::ControllerConfig;
use kfp_common::crd::{
    Experiment, NamedValue, NamespacedName, OutputArtifact, Pipeline, Provider, Run,
    RunSchedule, Schedule,
};
use kfp_common::{Resource, ResourceKind};
use serde::Serialize;

use super::patch::apply_patches;
use super::PIPELINE_FRAMEWORK_IMAGE_PARAMETER;
use crate::argo::Parameter;
use crate::error::{WorkflowError, WorkflowParameterError};

/// Template suffix for resources that need compilation
pub const COMPILED_SUFFIX: &str = "compiled";

/// Template suffix for everything else
pub const SIMPLE_SUFFIX: &str = "simple";

/// A resource that can be expressed as a provider workflow
pub trait WorkflowResource: Resource {
    /// Suffix of the create and update WorkflowTemplates
    const TEMPLATE_SUFFIX: &'static str = SIMPLE_SUFFIX;

    /// Definition sent to the provider
    fn definition(
        &self,
        config: &ControllerConfig,
        provider: &Provider,
    ) -> Result<serde_json::Value, WorkflowError>;

    /// Parameters beyond the common set
    fn additional_parameters(&self, _provider: &Provider) -> Result<Vec<Parameter>, WorkflowError> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Pipeline as seen by providers
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    /// `namespace/name`
    pub name: NamespacedName,
    /// Version being synchronized
    pub version: String,
    /// Pipeline image
    pub image: String,
    /// Compiler environment
    pub env: Vec<NamedValue>,
    /// Framework and its parameters
    pub framework: FrameworkDefinition,
}

/// Framework section of a pipeline definition
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FrameworkDefinition {
    /// Framework name
    pub name: String,
    /// Framework parameters
    pub parameters: BTreeMap<String, serde_json::Value>,
}

fn framework_not_supported(name: &str) -> WorkflowError {
    WorkflowParameterError(format!("[{}] framework not support by provider", name)).into()
}

impl WorkflowResource for Pipeline {
    const TEMPLATE_SUFFIX: &'static str = COMPILED_SUFFIX;

    fn definition(
        &self,
        _config: &ControllerConfig,
        provider: &Provider,
    ) -> Result<serde_json::Value, WorkflowError> {
        let name = &self.spec.framework.name;
        let framework = provider
            .framework(name)
            .ok_or_else(|| framework_not_supported(name))?;

        let definition = PipelineDefinition {
            name: self.namespaced_name(),
            version: self.compute_version(),
            image: self.spec.image.clone(),
            env: self.spec.env.clone(),
            framework: FrameworkDefinition {
                name: name.clone(),
                parameters: self.spec.framework.parameters.clone(),
            },
        };

        apply_patches(&framework.patches, serde_json::to_value(definition)?)
    }

    fn additional_parameters(&self, provider: &Provider) -> Result<Vec<Parameter>, WorkflowError> {
        let name = &self.spec.framework.name;
        let framework = provider
            .framework(name)
            .ok_or_else(|| framework_not_supported(name))?;
        Ok(vec![Parameter::new(
            PIPELINE_FRAMEWORK_IMAGE_PARAMETER,
            &framework.image,
        )])
    }
}

// =============================================================================
// Experiment
// =============================================================================

/// Experiment as seen by providers
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentDefinition {
    /// `namespace/name`
    pub name: NamespacedName,
    /// Version being synchronized
    pub version: String,
    /// Description
    pub description: String,
}

impl WorkflowResource for Experiment {
    fn definition(
        &self,
        _config: &ControllerConfig,
        _provider: &Provider,
    ) -> Result<serde_json::Value, WorkflowError> {
        Ok(serde_json::to_value(ExperimentDefinition {
            name: self.namespaced_name(),
            version: self.compute_version(),
            description: self.spec.description.clone(),
        })?)
    }
}

// =============================================================================
// Run and RunSchedule
// =============================================================================

/// Run as seen by providers
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunDefinition {
    /// `namespace/name`
    pub name: NamespacedName,
    /// Version being synchronized
    pub version: String,
    /// Pipeline in the run's namespace
    pub pipeline_name: NamespacedName,
    /// Resolved pipeline version
    pub pipeline_version: String,
    /// Owning RunConfiguration, empty for standalone runs
    pub run_configuration_name: NamespacedName,
    /// Experiment to run under
    pub experiment_name: NamespacedName,
    /// Resolved parameters
    pub parameters: BTreeMap<String, String>,
    /// Declared output artifacts
    pub artifacts: Vec<OutputArtifact>,
}

/// RunSchedule as seen by providers
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunScheduleDefinition {
    /// `namespace/name`
    pub name: NamespacedName,
    /// Version being synchronized
    pub version: String,
    /// Pipeline in the schedule's namespace
    pub pipeline_name: NamespacedName,
    /// Pinned pipeline version
    pub pipeline_version: String,
    /// Owning RunConfiguration
    pub run_configuration_name: NamespacedName,
    /// Experiment to run under
    pub experiment_name: NamespacedName,
    /// Parameters
    pub parameters: BTreeMap<String, String>,
    /// Declared output artifacts
    pub artifacts: Vec<OutputArtifact>,
    /// When to run
    pub schedule: Schedule,
}

/// Experiment reference, falling back to the configured default
///
/// The default experiment is not namespaced.
fn experiment_name(namespace: &str, name: &str, config: &ControllerConfig) -> NamespacedName {
    if name.is_empty() {
        NamespacedName::new("", &config.default_experiment)
    } else {
        NamespacedName::new(namespace, name)
    }
}

/// RunConfiguration that controls `resource`, if any
fn run_configuration_name<R: Resource>(resource: &R) -> NamespacedName {
    resource
        .meta()
        .owner_references
        .iter()
        .flatten()
        .find(|r| {
            r.controller == Some(true) && r.kind == ResourceKind::RunConfiguration.kind_name()
        })
        .map(|r| NamespacedName::new(resource.namespaced_name().namespace, &r.name))
        .unwrap_or_default()
}

fn parameter_map(parameters: impl IntoIterator<Item = NamedValue>) -> BTreeMap<String, String> {
    parameters.into_iter().map(|p| (p.name, p.value)).collect()
}

impl WorkflowResource for Run {
    fn definition(
        &self,
        config: &ControllerConfig,
        _provider: &Provider,
    ) -> Result<serde_json::Value, WorkflowError> {
        let pipeline_version = self.observed_pipeline_version();
        if pipeline_version.is_empty() {
            return Err(WorkflowParameterError("unknown pipeline version".to_string()).into());
        }

        let (parameters, _) = self
            .spec
            .resolve_parameters(&self.dependencies())
            .map_err(|e| WorkflowParameterError(e.to_string()))?;

        let name = self.namespaced_name();
        let definition = RunDefinition {
            pipeline_name: NamespacedName::new(&name.namespace, &self.spec.pipeline.name),
            pipeline_version,
            run_configuration_name: run_configuration_name(self),
            experiment_name: experiment_name(&name.namespace, &self.spec.experiment_name, config),
            parameters: parameter_map(parameters),
            artifacts: self.spec.artifacts.clone(),
            version: self.compute_version(),
            name,
        };
        Ok(serde_json::to_value(definition)?)
    }
}

impl WorkflowResource for RunSchedule {
    fn definition(
        &self,
        config: &ControllerConfig,
        _provider: &Provider,
    ) -> Result<serde_json::Value, WorkflowError> {
        let name = self.namespaced_name();
        let definition = RunScheduleDefinition {
            pipeline_name: NamespacedName::new(&name.namespace, &self.spec.pipeline.name),
            pipeline_version: self.spec.pipeline.version.clone(),
            run_configuration_name: run_configuration_name(self),
            experiment_name: experiment_name(&name.namespace, &self.spec.experiment_name, config),
            parameters: parameter_map(self.spec.parameters.clone()),
            artifacts: self.spec.artifacts.clone(),
            schedule: self.spec.schedule.clone(),
            version: self.compute_version(),
            name,
        };
        Ok(serde_json::to_value(definition)?)
    }
}
