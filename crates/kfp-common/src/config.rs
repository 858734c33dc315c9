//! Controller configuration
//!
//! Loaded once by the operator binary and passed as `Arc<ControllerConfig>`
//! into every controller context and workflow factory.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result, DEBUG_ANNOTATION};

/// Environment variable overriding `workflowNamespace`
pub const WORKFLOW_NAMESPACE_ENV: &str = "KFP_WORKFLOW_NAMESPACE";

/// Environment variable overriding `defaultProvider`
pub const DEFAULT_PROVIDER_ENV: &str = "KFP_DEFAULT_PROVIDER";

// =============================================================================
// DebugOptions
// =============================================================================

/// Per-resource debugging switches
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DebugOptions {
    /// Keep finished workflows instead of deleting them
    #[serde(default)]
    pub keep_workflows: bool,
}

impl DebugOptions {
    /// Read options from the debug annotation
    ///
    /// A malformed annotation is logged and treated as absent.
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let Some(raw) = annotations.get(DEBUG_ANNOTATION) else {
            return Self::default();
        };
        match serde_json::from_str(raw) {
            Ok(options) => options,
            Err(e) => {
                warn!(annotation = DEBUG_ANNOTATION, value = %raw, error = %e, "Ignoring malformed debug annotation");
                Self::default()
            }
        }
    }

    /// Enable anything the defaults enable
    pub fn with_defaults(self, defaults: DebugOptions) -> Self {
        Self {
            keep_workflows: self.keep_workflows || defaults.keep_workflows,
        }
    }

    /// Annotation map carrying these options
    pub fn to_annotations(self) -> BTreeMap<String, String> {
        let value = serde_json::json!({ "keepWorkflows": self.keep_workflows });
        BTreeMap::from([(DEBUG_ANNOTATION.to_string(), value.to_string())])
    }
}

// =============================================================================
// ControllerConfig
// =============================================================================

/// Values used when deploying provider services
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultProviderValues {
    /// Labels added to provider Deployments and Services
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Provider service replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    /// Pod template for provider services; a single container is used when absent
    #[serde(default)]
    pub pod_template_spec: Option<PodTemplateSpec>,
    /// Container in the pod template that runs the provider service
    #[serde(default = "default_service_container_name")]
    pub service_container_name: String,
    /// HTTP port of the provider service
    #[serde(default = "default_service_port")]
    pub service_port: i32,
    /// Metrics port of the provider service
    #[serde(default = "default_metrics_port")]
    pub metrics_port: i32,
}

impl Default for DefaultProviderValues {
    fn default() -> Self {
        Self {
            labels: BTreeMap::new(),
            replicas: default_replicas(),
            pod_template_spec: None,
            service_container_name: default_service_container_name(),
            service_port: default_service_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

fn default_replicas() -> i32 {
    1
}

fn default_service_container_name() -> String {
    "provider-service".to_string()
}

fn default_service_port() -> i32 {
    8080
}

fn default_metrics_port() -> i32 {
    8081
}

fn default_workflow_template_prefix() -> String {
    "kfp-operator-".to_string()
}

fn default_workflow_namespace() -> String {
    "kfp-operator-system".to_string()
}

fn default_experiment() -> String {
    "Default".to_string()
}

/// Operator-wide settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Provider used when a resource names none
    #[serde(default)]
    pub default_provider: String,

    /// Provider service deployment values
    #[serde(default)]
    pub default_provider_values: DefaultProviderValues,

    /// Prefix of the Argo WorkflowTemplates referenced by created workflows
    #[serde(default = "default_workflow_template_prefix")]
    pub workflow_template_prefix: String,

    /// Namespace workflows are created in
    #[serde(default = "default_workflow_namespace")]
    pub workflow_namespace: String,

    /// Experiment used by runs that name none
    #[serde(default = "default_experiment")]
    pub default_experiment: String,

    /// How long completed runs are kept, e.g. `"1h"`
    #[serde(
        rename = "runCompletionTTL",
        default,
        with = "humantime_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_completion_ttl: Option<Duration>,

    /// Debug defaults OR-ed with each resource's annotation
    #[serde(default)]
    pub debug: DebugOptions,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_provider: String::new(),
            default_provider_values: DefaultProviderValues::default(),
            workflow_template_prefix: default_workflow_template_prefix(),
            workflow_namespace: default_workflow_namespace(),
            default_experiment: default_experiment(),
            run_completion_ttl: None,
            debug: DebugOptions::default(),
        }
    }
}

impl ControllerConfig {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid controller configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&yaml)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ns) = lookup(WORKFLOW_NAMESPACE_ENV).filter(|v| !v.is_empty()) {
            self.workflow_namespace = ns;
        }
        if let Some(provider) = lookup(DEFAULT_PROVIDER_ENV).filter(|v| !v.is_empty()) {
            self.default_provider = provider;
        }
        self
    }

    /// Reject configurations no controller can work with
    pub fn validate(&self) -> Result<()> {
        if self.workflow_namespace.is_empty() {
            return Err(Error::config("workflowNamespace must not be empty"));
        }
        if self.default_provider_values.service_port <= 0 {
            return Err(Error::config("defaultProviderValues.servicePort must be positive"));
        }
        Ok(())
    }
}

mod humantime_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.filter(|s| !s.is_empty())
            .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
