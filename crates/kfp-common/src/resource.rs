//! The capability every synchronized resource provides
//!
//! The state machine, workflow factory and executor only ever see a
//! [`Resource`], so one engine serves every kind.

use std::fmt;

use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crd::{NamespacedName, Status};

/// The kinds of resource the operator manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Compiled and uploaded pipeline
    Pipeline,
    /// Experiment runs are grouped under
    Experiment,
    /// One-off pipeline run
    Run,
    /// Run template with triggers
    RunConfiguration,
    /// Scheduled run owned by a RunConfiguration
    RunSchedule,
    /// Provider service configuration
    Provider,
}

impl ResourceKind {
    /// Lowercase name used in labels, parameters and generated names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Experiment => "experiment",
            Self::Run => "run",
            Self::RunConfiguration => "runconfiguration",
            Self::RunSchedule => "runschedule",
            Self::Provider => "provider",
        }
    }

    /// Kubernetes `kind`
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Pipeline => "Pipeline",
            Self::Experiment => "Experiment",
            Self::Run => "Run",
            Self::RunConfiguration => "RunConfiguration",
            Self::RunSchedule => "RunSchedule",
            Self::Provider => "Provider",
        }
    }

    /// Parse the lowercase label form
    pub fn from_label(value: &str) -> Option<Self> {
        [
            Self::Pipeline,
            Self::Experiment,
            Self::Run,
            Self::RunConfiguration,
            Self::RunSchedule,
            Self::Provider,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A namespaced custom resource synchronized with a provider
pub trait Resource:
    kube::Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Kind of this resource
    const KIND: ResourceKind;

    /// Current synchronization status, defaulted when unset
    fn sync_status(&self) -> Status;

    /// Replace the synchronization status
    fn set_sync_status(&mut self, status: Status);

    /// Deterministic hash of the spec
    fn compute_version(&self) -> String;

    /// Provider named in the spec, if the kind has one
    fn spec_provider(&self) -> Option<&NamespacedName>;

    /// Kind of this resource
    fn resource_kind(&self) -> ResourceKind {
        Self::KIND
    }

    /// `namespace/name` of this resource
    fn namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Whether a deletion timestamp is set
    fn deletion_requested(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    /// `metadata.generation`, zero when unset
    fn generation(&self) -> i64 {
        self.meta().generation.unwrap_or_default()
    }
}
