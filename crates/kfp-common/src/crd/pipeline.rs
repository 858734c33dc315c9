//! Pipeline CRD
//!
//! A pipeline is a container image plus the framework used to compile it.
//! Its version combines the image tag with a hash of the spec so that
//! `kubectl get` shows which build a provider holds.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::Status;
use super::types::{any_json_map, NamedValue, NamespacedName};
use crate::hash::{short_hex, ObjectHasher};
use crate::resource::{Resource, ResourceKind};

/// Framework used when a pipeline names none
pub const FALLBACK_FRAMEWORK: &str = "tfx";

/// Pipeline synchronized with a provider
///
/// Example:
/// ```yaml
/// apiVersion: pipelines.kubeflow.org/v1beta1
/// kind: Pipeline
/// metadata:
///   name: penguin
/// spec:
///   provider: kfp-operator/vertex
///   image: ghcr.io/team/penguin:1.4.0
///   framework:
///     name: tfx
///     parameters:
///       components: penguin.pipeline.create_components
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pipelines.kubeflow.org",
    version = "v1beta1",
    kind = "Pipeline",
    namespaced,
    status = "Status",
    shortname = "mlp",
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider.name"}"#,
    printcolumn = r#"{"name":"SynchronizationState","type":"string","jsonPath":".status.conditions[?(@.type==\"Synchronized\")].reason"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    /// Provider to upload to; defaults to the controller's default provider
    #[serde(default)]
    pub provider: NamespacedName,

    /// Pipeline container image
    pub image: String,

    /// Environment passed to the compiler
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<NamedValue>,

    /// Compilation framework
    #[serde(default)]
    pub framework: PipelineFramework,
}

/// Framework and its free-form parameters
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PipelineFramework {
    /// Framework name, matched case-insensitively against the provider
    pub name: String,

    /// Framework-specific parameters
    #[serde(default)]
    #[schemars(schema_with = "any_json_map")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Default for PipelineFramework {
    fn default() -> Self {
        Self {
            name: FALLBACK_FRAMEWORK.to_string(),
            parameters: BTreeMap::new(),
        }
    }
}

impl Pipeline {
    /// Full digest of the spec
    pub fn compute_hash(&self) -> Vec<u8> {
        let mut hasher = ObjectHasher::new();
        hasher.write_string_field(&self.spec.image);
        hasher.write_kv_list_field(&self.spec.env);
        hasher.write_string_field(&self.spec.framework.name);
        hasher.write_json_map_field(&self.spec.framework.parameters);
        hasher.sum()
    }
}

/// Tag of a container image reference
///
/// Untagged names default to `latest`. Digest-only and malformed references
/// have no tag.
pub fn image_tag(image: &str) -> Option<String> {
    if image.is_empty() || image.chars().any(|c| c.is_whitespace() || c.is_ascii_uppercase()) {
        return None;
    }

    let (name, digest) = match image.split_once('@') {
        Some((name, digest)) => (name, Some(digest)),
        None => (image, None),
    };
    if digest.is_some_and(|d| !d.contains(':')) {
        return None;
    }

    let path_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let last_component = &name[path_start..];

    match last_component.split_once(':') {
        Some((repo, tag)) => {
            if repo.is_empty() || !is_valid_tag(tag) {
                return None;
            }
            Some(tag.to_string())
        }
        None if last_component.is_empty() => None,
        None if digest.is_some() => None,
        None => Some("latest".to_string()),
    }
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    tag.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl Resource for Pipeline {
    const KIND: ResourceKind = ResourceKind::Pipeline;

    fn sync_status(&self) -> Status {
        self.status.clone().unwrap_or_default()
    }

    fn set_sync_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    fn compute_version(&self) -> String {
        let hash = short_hex(&self.compute_hash());
        match image_tag(&self.spec.image) {
            Some(tag) => format!("{}-{}", tag, hash),
            None => hash,
        }
    }

    fn spec_provider(&self) -> Option<&NamespacedName> {
        Some(&self.spec.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pipeline(image: &str) -> Pipeline {
        Pipeline::new(
            "penguin",
            PipelineSpec {
                image: image.to_string(),
                ..Default::default()
            },
        )
    }

    fn version_parts(version: &str) -> (Option<&str>, &str) {
        match version.rsplit_once('-') {
            Some((tag, hash)) => (Some(tag), hash),
            None => (None, version),
        }
    }

    mod compute_version {
        use super::*;

        #[test]
        fn includes_the_image_tag() {
            let version = sample_pipeline("image:42").compute_version();
            let (tag, hash) = version_parts(&version);
            assert_eq!(tag, Some("42"));
            assert_eq!(hash.len(), 6);

            let version = sample_pipeline("docker.io/baz/bar/image:baz").compute_version();
            assert!(version.starts_with("baz-"));
        }

        #[test]
        fn untagged_images_are_latest() {
            assert!(sample_pipeline("image").compute_version().starts_with("latest-"));
        }

        #[test]
        fn registry_ports_are_not_tags() {
            assert!(sample_pipeline("localhost:5000/image")
                .compute_version()
                .starts_with("latest-"));
        }

        #[test]
        fn malformed_images_have_hash_only() {
            let version = sample_pipeline(":").compute_version();
            assert_eq!(version.len(), 6);
            assert!(!version.contains('-'));
        }

        #[test]
        fn digest_only_images_have_hash_only() {
            let version = sample_pipeline("image@sha256:abcdef").compute_version();
            assert_eq!(version.len(), 6);
        }
    }

    mod compute_hash {
        use super::*;

        #[test]
        fn image_changes_hash() {
            assert_ne!(
                sample_pipeline("").compute_hash(),
                sample_pipeline("notempty").compute_hash()
            );
        }

        #[test]
        fn framework_changes_hash() {
            let plain = sample_pipeline("image:1");
            let mut tuned = plain.clone();
            tuned
                .spec
                .framework
                .parameters
                .insert("key".to_string(), serde_json::json!("value"));
            assert_ne!(plain.compute_hash(), tuned.compute_hash());
        }

        #[test]
        fn env_order_does_not_matter() {
            let mut a = sample_pipeline("image:1");
            a.spec.env = vec![NamedValue::new("a", "1"), NamedValue::new("b", "2")];
            let mut b = sample_pipeline("image:1");
            b.spec.env = vec![NamedValue::new("b", "2"), NamedValue::new("a", "1")];
            assert_eq!(a.compute_version(), b.compute_version());
        }

        #[test]
        fn env_entries_change_hash() {
            let mut a = sample_pipeline("image:1");
            a.spec.env = vec![NamedValue::new("a", "")];
            let mut b = a.clone();
            b.spec.env = vec![NamedValue::new("b", "NotEmpty")];
            assert_ne!(sample_pipeline("image:1").compute_hash(), a.compute_hash());
            assert_ne!(a.compute_hash(), b.compute_hash());
        }
    }

    #[test]
    fn status_defaults_when_unset() {
        let pipeline = sample_pipeline("image:1");
        assert_eq!(pipeline.sync_status(), Status::default());
    }
}
