//! Custom Resource Definitions for the KFP operator
//!
//! Every kind lives in group `pipelines.kubeflow.org`, version `v1beta1`.

mod experiment;
mod pipeline;
mod provider;
mod run;
mod run_configuration;
mod run_schedule;
mod status;
mod types;

pub use experiment::{Experiment, ExperimentSpec};
pub use pipeline::{image_tag, Pipeline, PipelineFramework, PipelineSpec, FALLBACK_FRAMEWORK};
pub use provider::{Framework, Patch, PatchType, Provider, ProviderSpec};
pub use run::{
    CompletionState, Dependencies, ObservedPipeline, Parameter, ParameterError,
    PipelineIdentifier, Run, RunConfigurationRef, RunReference, RunSpec, RunStatus, ValueFrom,
};
pub use run_configuration::{
    LatestRuns, OnChangeType, RunConfiguration, RunConfigurationSpec, RunConfigurationStatus,
    TriggeredRunReference, TriggeredVersion, Triggers, TriggersStatus,
};
pub use run_schedule::{RunSchedule, RunScheduleSpec, Schedule};
pub use status::{
    merge_condition, ProviderAndId, Status, SynchronizationState, CONDITION_SYNCHRONIZED,
};
pub use types::{
    any_json_map, Artifact, Condition, ConditionStatus, NamedValue, NamespacedName,
    OutputArtifact,
};
