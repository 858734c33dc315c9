//! Provider CRD
//!
//! A Provider describes a pipeline backend: the service that talks to it and
//! the frameworks it can compile.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::Status;
use super::types::{any_json_map, NamespacedName};
use crate::resource::{Resource, ResourceKind};

/// Provider service and capabilities
///
/// Example:
/// ```yaml
/// apiVersion: pipelines.kubeflow.org/v1beta1
/// kind: Provider
/// metadata:
///   name: vertex
///   namespace: kfp-operator
/// spec:
///   serviceImage: ghcr.io/kfp-operator/vertex-provider:0.7.0
///   serviceAccount: kfp-operator-vertex
///   pipelineRootStorage: gs://pipelines
///   frameworks:
///     - name: tfx
///       image: ghcr.io/kfp-operator/tfx-compiler:0.7.0
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pipelines.kubeflow.org",
    version = "v1beta1",
    kind = "Provider",
    namespaced,
    status = "Status",
    shortname = "mlprv",
    printcolumn = r#"{"name":"SynchronizationState","type":"string","jsonPath":".status.conditions[?(@.type==\"Synchronized\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Image of the provider service
    pub service_image: String,

    /// Service account for the service and its workflows
    #[serde(default)]
    pub service_account: String,

    /// Storage root for pipeline artifacts
    #[serde(default)]
    pub pipeline_root_storage: String,

    /// Provider-specific parameters, passed to the service as environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "any_json_map")]
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Supported pipeline frameworks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<Framework>,

    /// Namespaces allowed to use this provider; empty allows all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_namespaces: Vec<String>,
}

/// Pipeline framework supported by a provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Framework {
    /// Framework name
    pub name: String,

    /// Compiler image
    #[serde(default)]
    pub image: String,

    /// Patches applied to pipeline definitions before compilation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
}

/// Patch format
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    /// RFC 6902 JSON patch
    Json,
    /// RFC 7396 merge patch
    Merge,
}

/// Patch applied to a resource definition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Patch {
    /// Patch format
    #[serde(rename = "type")]
    pub type_: PatchType,

    /// Patch document as a JSON string
    pub payload: String,
}

impl Provider {
    /// Framework by name, case-insensitively
    pub fn framework(&self, name: &str) -> Option<&Framework> {
        self.spec
            .frameworks
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Whether resources in `namespace` may use this provider
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.spec.allowed_namespaces.is_empty()
            || self.spec.allowed_namespaces.iter().any(|n| n == namespace)
    }

    /// Name of the provider service's Deployment and Service
    pub fn service_name(&self) -> String {
        format!("provider-{}", self.namespaced_name().name)
    }
}

impl Resource for Provider {
    const KIND: ResourceKind = ResourceKind::Provider;

    fn sync_status(&self) -> Status {
        self.status.clone().unwrap_or_default()
    }

    fn set_sync_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    // Providers are not synchronized through workflows
    fn compute_version(&self) -> String {
        String::new()
    }

    fn spec_provider(&self) -> Option<&NamespacedName> {
        None
    }
}
