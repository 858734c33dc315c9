//! Argo Workflows for the KFP operator: typed workflows, labels, provider output, storage and construction

#![deny(missing_docs)]

pub mod argo;
pub mod error;
pub mod factory;
pub mod labels;
pub mod output;
pub mod repository;

pub use argo::{Workflow, WorkflowPhase};
pub use error::{WorkflowError, WorkflowParameterError, CONSTRUCTION_FAILED};
pub use factory::{ResourceWorkflowFactory, WorkflowFactory, WorkflowResource};
pub use labels::{Operation, WorkflowLabels};
pub use output::{provider_output, ProviderOutput};
pub use repository::{KubeWorkflowRepository, WorkflowRepository};
