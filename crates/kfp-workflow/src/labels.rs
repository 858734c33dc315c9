//! Typed workflow label schema
//!
//! Every workflow the operator creates carries the operation it performs and
//! the resource it belongs to. The same labels are used to find the
//! workflows of an operation and to map workflow events back to their owner.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kfp_common::crd::NamespacedName;
use kfp_common::{Resource, ResourceKind};
use thiserror::Error;

/// Operation a workflow performs
pub const OPERATION_LABEL: &str = "pipelines.kubeflow.org/operation";

/// Kind of the owning resource, lowercase
pub const OWNER_KIND_LABEL: &str = "pipelines.kubeflow.org/owner.kind";

/// Name of the owning resource
pub const OWNER_NAME_LABEL: &str = "pipelines.kubeflow.org/owner.name";

/// Namespace of the owning resource
pub const OWNER_NAMESPACE_LABEL: &str = "pipelines.kubeflow.org/owner.namespace";

/// Set on workflows that were kept after their result was consumed
pub const PROCESSED_LABEL: &str = "pipelines.kubeflow.org/processed";

/// Provider-side operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create the resource on the provider
    Create,
    /// Update an existing provider resource
    Update,
    /// Delete the provider resource
    Delete,
}

impl Operation {
    /// Label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(LabelError::InvalidOperation(other.to_string())),
        }
    }
}

/// Workflow labels that cannot be interpreted
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    /// A required label is absent
    #[error("missing label {0}")]
    Missing(&'static str),

    /// The operation label holds an unknown value
    #[error("unknown operation '{0}'")]
    InvalidOperation(String),

    /// The owner kind label holds an unknown value
    #[error("unknown owner kind '{0}'")]
    InvalidKind(String),
}

/// Labels identifying the workflows of one operation on one resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowLabels {
    /// Operation
    pub operation: Operation,
    /// Owner kind
    pub owner_kind: ResourceKind,
    /// Owner namespace and name
    pub owner: NamespacedName,
}

impl WorkflowLabels {
    /// Labels for `operation` on `resource`
    pub fn for_resource<R: Resource>(resource: &R, operation: Operation) -> Self {
        Self {
            operation,
            owner_kind: R::KIND,
            owner: resource.namespaced_name(),
        }
    }

    /// Label map to put on a workflow
    pub fn to_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (OPERATION_LABEL.to_string(), self.operation.to_string()),
            (OWNER_KIND_LABEL.to_string(), self.owner_kind.to_string()),
            (OWNER_NAME_LABEL.to_string(), self.owner.name.clone()),
            (OWNER_NAMESPACE_LABEL.to_string(), self.owner.namespace.clone()),
        ])
    }

    /// Label selector matching unprocessed workflows with these labels
    pub fn selector(&self) -> String {
        let mut terms: Vec<String> = self
            .to_labels()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        terms.push(format!("{}!=true", PROCESSED_LABEL));
        terms.join(",")
    }

    /// Parse the labels of a workflow
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Result<Self, LabelError> {
        let get = |key: &'static str| labels.get(key).ok_or(LabelError::Missing(key));

        let operation = get(OPERATION_LABEL)?.parse()?;
        let kind = get(OWNER_KIND_LABEL)?;
        let owner_kind =
            ResourceKind::from_label(kind).ok_or_else(|| LabelError::InvalidKind(kind.clone()))?;
        let owner = NamespacedName::new(get(OWNER_NAMESPACE_LABEL)?, get(OWNER_NAME_LABEL)?);

        Ok(Self {
            operation,
            owner_kind,
            owner,
        })
    }
}

/// Whether a workflow has been marked processed
pub fn is_processed(labels: &BTreeMap<String, String>) -> bool {
    labels.get(PROCESSED_LABEL).is_some_and(|v| v == "true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kfp_common::crd::{Experiment, ExperimentSpec};

    fn sample_labels() -> WorkflowLabels {
        WorkflowLabels {
            operation: Operation::Update,
            owner_kind: ResourceKind::RunSchedule,
            owner: NamespacedName::new("team-a", "nightly-0"),
        }
    }

    #[test]
    fn labels_parse_back() {
        let labels = sample_labels();
        assert_eq!(WorkflowLabels::from_labels(&labels.to_labels()), Ok(labels));
    }

    #[test]
    fn labels_are_taken_from_the_resource() {
        let mut experiment = Experiment::new("nightly", ExperimentSpec::default());
        experiment.metadata.namespace = Some("team-a".to_string());

        let labels = WorkflowLabels::for_resource(&experiment, Operation::Create).to_labels();
        assert_eq!(labels[OPERATION_LABEL], "create");
        assert_eq!(labels[OWNER_KIND_LABEL], "experiment");
        assert_eq!(labels[OWNER_NAME_LABEL], "nightly");
        assert_eq!(labels[OWNER_NAMESPACE_LABEL], "team-a");
    }

    #[test]
    fn selector_excludes_processed_workflows() {
        let selector = sample_labels().selector();
        assert!(selector.contains("pipelines.kubeflow.org/operation=update"));
        assert!(selector.ends_with("pipelines.kubeflow.org/processed!=true"));
    }

    mod parse_errors {
        use super::*;

        #[test]
        fn missing_labels_are_named() {
            let mut labels = sample_labels().to_labels();
            labels.remove(OWNER_NAME_LABEL);
            assert_eq!(
                WorkflowLabels::from_labels(&labels),
                Err(LabelError::Missing(OWNER_NAME_LABEL))
            );
        }

        #[test]
        fn unknown_operations_are_rejected() {
            let mut labels = sample_labels().to_labels();
            labels.insert(OPERATION_LABEL.to_string(), "upsert".to_string());
            assert_eq!(
                WorkflowLabels::from_labels(&labels),
                Err(LabelError::InvalidOperation("upsert".to_string()))
            );
        }

        #[test]
        fn unknown_kinds_are_rejected() {
            let mut labels = sample_labels().to_labels();
            labels.insert(OWNER_KIND_LABEL.to_string(), "Pipeline".to_string());
            assert!(matches!(
                WorkflowLabels::from_labels(&labels),
                Err(LabelError::InvalidKind(_))
            ));
        }
    }

    #[test]
    fn processed_requires_true() {
        let mut labels = BTreeMap::new();
        assert!(!is_processed(&labels));
        labels.insert(PROCESSED_LABEL.to_string(), "false".to_string());
        assert!(!is_processed(&labels));
        labels.insert(PROCESSED_LABEL.to_string(), "true".to_string());
        assert!(is_processed(&labels));
    }
}
