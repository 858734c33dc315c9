//! Common types for the KFP operator: CRDs, status, hashing, configuration and observability

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod events;
pub mod hash;
pub mod metrics;
pub mod resource;
pub mod retry;
pub mod telemetry;

pub use error::Error;
pub use resource::{Resource, ResourceKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group shared by every resource, label and annotation the operator owns
pub const GROUP: &str = "pipelines.kubeflow.org";

/// API version served for all pipeline resources
pub const API_VERSION: &str = "v1beta1";

/// Finalizer held while external side effects may still be pending
pub const FINALIZER_NAME: &str = "finalizer.pipelines.kubeflow.org";

/// Field manager used for server-side apply and merge patches
pub const FIELD_MANAGER: &str = "kfp-operator";

/// Annotation overriding the provider a resource is synchronized with
pub const PROVIDER_ANNOTATION: &str = "pipelines.kubeflow.org/provider";

/// Annotation carrying per-resource debug options as JSON
pub const DEBUG_ANNOTATION: &str = "pipelines.kubeflow.org/debug";
