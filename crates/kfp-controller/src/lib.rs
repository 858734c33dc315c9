//! Kubernetes reconcilers for the KFP operator
//!
//! Pipelines, Experiments and RunSchedules go straight through the shared
//! [`reconciler`]. Runs wait for their dependencies first, RunConfigurations
//! manage owned Runs and RunSchedules, and Providers deploy their service.

#![deny(missing_docs)]

pub mod client;
pub mod dependencies;
pub mod error;
pub mod provider;
pub mod provider_controller;
pub mod reconciler;
pub mod run;
pub mod run_configuration;

#[cfg(test)]
mod testing;

pub use client::{KfpClient, KubeKfpClient};
pub use error::ReconcileError;
pub use reconciler::{error_policy, workflow_owner, Context, SyncContext};
