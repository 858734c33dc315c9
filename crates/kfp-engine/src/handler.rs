//! State handler
//!
//! Maps a resource, its provider and the workflows of its current operation
//! to the commands that move it through its synchronization lifecycle:
//!
//! ```text
//!   Unknown ──► Creating ──► Succeeded ◄──► Updating
//!                   │            │ ▲            │
//!                   ▼            ▼ │            ▼
//!                 Failed ◄───────┴─┴──────── Failed
//!                   │
//!    deletion ──► Deleting ──► Deleted
//! ```
//!
//! The only I/O is the workflow repository read. All mutation is left to
//! the [`CommandExecutor`](crate::executor::CommandExecutor).

use std::sync::Arc;

use kfp_common::crd::{NamespacedName, Provider, ProviderAndId, Status, SynchronizationState};
use kfp_common::Resource;
use kfp_workflow::output::provider_output;
use kfp_workflow::{Operation, Workflow, WorkflowFactory, WorkflowLabels, WorkflowRepository};
use tracing::{debug, error, info};

use crate::command::{Command, SetStatus, Transition};
use crate::error::EngineError;
use crate::generation::always_set_observed_generation;
use crate::phase::latest_workflow_by_phase;
use crate::verifier::IdVerifier;

/// Message when a resource's desired provider differs from the one it was synchronized with
pub const PROVIDER_CHANGED: &str = "the provider has changed";

/// Fail a resource whose provider changed under it
///
/// Once an operation targeted a provider, the resource stays with it. The one
/// exception is `Deleted`: nothing is left on either provider, so the guard
/// never stands between a deleted resource and the release of its finalizer.
pub fn provider_changed_guard(status: &Status, desired: &NamespacedName) -> Option<SetStatus> {
    let current = &status.provider.name;
    let changed = !current.is_empty() && current != desired;
    (changed && status.synchronization_state != SynchronizationState::Deleted).then(|| {
        SetStatus::from_status(status.clone())
            .with_state(SynchronizationState::Failed)
            .with_message(PROVIDER_CHANGED)
    })
}

/// State machine for one resource kind
pub struct StateHandler<R> {
    factory: Arc<dyn WorkflowFactory<R>>,
    repository: Arc<dyn WorkflowRepository>,
}

impl<R: Resource> StateHandler<R> {
    /// Create a handler
    pub fn new(
        factory: Arc<dyn WorkflowFactory<R>>,
        repository: Arc<dyn WorkflowRepository>,
    ) -> Self {
        Self {
            factory,
            repository,
        }
    }

    /// Commands for one reconcile pass, finalizer command first
    pub async fn state_transition(
        &self,
        provider: &Provider,
        resource: &R,
    ) -> Result<Vec<Command>, EngineError> {
        debug!(
            resource = %resource.namespaced_name(),
            state = %resource.sync_status().synchronization_state,
            "state transition start"
        );
        let transition = self.transition(provider, resource).await?;
        Ok(always_set_observed_generation(
            transition.into_commands(),
            resource,
        ))
    }

    /// Commands for a pass that needs no provider, if the resource is in one
    ///
    /// A deleted resource only releases its finalizer, and a deletion
    /// requested before any provider id was recorded finishes without a
    /// workflow. Everything else needs the provider and returns `None`.
    pub fn state_transition_without_provider(&self, resource: &R) -> Option<Vec<Command>> {
        let status = resource.sync_status();
        let transition = match status.synchronization_state {
            SynchronizationState::Deleted => Transition::Terminal(Vec::new()),
            SynchronizationState::Succeeded | SynchronizationState::Failed
                if resource.deletion_requested() && status.provider.id.is_empty() =>
            {
                Transition::NonTerminal(vec![deleted(&status)])
            }
            _ => return None,
        };
        debug!(
            resource = %resource.namespaced_name(),
            state = %status.synchronization_state,
            "state transition without provider"
        );
        Some(always_set_observed_generation(
            transition.into_commands(),
            resource,
        ))
    }

    async fn transition(&self, provider: &Provider, resource: &R) -> Result<Transition, EngineError> {
        let status = resource.sync_status();

        if let Some(failed) = provider_changed_guard(&status, &provider.namespaced_name()) {
            info!(
                resource = %resource.namespaced_name(),
                current = %status.provider.name,
                desired = %provider.namespaced_name(),
                "provider changed, failing resource"
            );
            return Ok(Transition::NonTerminal(vec![failed.into()]));
        }

        let commands = match status.synchronization_state {
            SynchronizationState::Creating => self.on_creating(resource, &status).await?,
            SynchronizationState::Succeeded | SynchronizationState::Failed
                if resource.deletion_requested() =>
            {
                self.on_delete(provider, resource, &status).await?
            }
            SynchronizationState::Succeeded | SynchronizationState::Failed => {
                self.on_succeeded_or_failed(provider, resource, &status)
                    .await?
            }
            SynchronizationState::Updating => self.on_updating(resource, &status).await?,
            SynchronizationState::Deleting => {
                let workflows = self.workflows(resource, Operation::Delete).await?;
                set_state_if_provider_finished(
                    resource,
                    &status,
                    workflows,
                    IdVerifier::DELETED_FOR_EMPTY_ID,
                )
            }
            SynchronizationState::Deleted => return Ok(Transition::Terminal(Vec::new())),
            SynchronizationState::Unknown => self.on_unknown(provider, resource, &status).await?,
        };

        Ok(Transition::NonTerminal(commands))
    }

    async fn on_unknown(
        &self,
        provider: &Provider,
        resource: &R,
        status: &Status,
    ) -> Result<Vec<Command>, EngineError> {
        let version = resource.compute_version();
        let failure = SetStatus::from_status(status.clone())
            .with_state(SynchronizationState::Failed)
            .with_version(&version);

        if !status.provider.id.is_empty() {
            info!(resource = %resource.namespaced_name(), "empty state but provider id already exists, updating resource");
            let target = SetStatus::from_status(status.clone())
                .with_state(SynchronizationState::Updating)
                .with_version(&version)
                .with_provider(provider.namespaced_name());
            return self
                .begin(provider, resource, Operation::Update, target, failure)
                .await;
        }

        info!(resource = %resource.namespaced_name(), "empty state, creating resource");
        let target = SetStatus::from_status(Status {
            provider: ProviderAndId {
                name: provider.namespaced_name(),
                id: String::new(),
            },
            synchronization_state: SynchronizationState::Creating,
            version,
            ..Default::default()
        });
        self.begin(provider, resource, Operation::Create, target, failure)
            .await
    }

    async fn on_delete(
        &self,
        provider: &Provider,
        resource: &R,
        status: &Status,
    ) -> Result<Vec<Command>, EngineError> {
        info!(resource = %resource.namespaced_name(), "deletion requested, deleting");

        if status.provider.id.is_empty() {
            return Ok(vec![deleted(status)]);
        }

        let target =
            SetStatus::from_status(status.clone()).with_state(SynchronizationState::Deleting);
        let failure =
            SetStatus::from_status(status.clone()).with_state(SynchronizationState::Failed);
        self.begin(provider, resource, Operation::Delete, target, failure)
            .await
    }

    async fn on_succeeded_or_failed(
        &self,
        provider: &Provider,
        resource: &R,
        status: &Status,
    ) -> Result<Vec<Command>, EngineError> {
        let version = resource.compute_version();
        if status.version == version {
            debug!(resource = %resource.namespaced_name(), "resource version has not changed");
            return Ok(Vec::new());
        }

        let (operation, state) = if status.provider.id.is_empty() {
            info!(resource = %resource.namespaced_name(), "no provider id exists, creating");
            (Operation::Create, SynchronizationState::Creating)
        } else {
            info!(resource = %resource.namespaced_name(), "provider id exists, updating");
            (Operation::Update, SynchronizationState::Updating)
        };

        let target = SetStatus::from_status(status.clone())
            .with_state(state)
            .with_version(&version)
            .with_provider(provider.namespaced_name());
        let failure = SetStatus::from_status(status.clone())
            .with_state(SynchronizationState::Failed)
            .with_version(&version);
        self.begin(provider, resource, operation, target, failure)
            .await
    }

    async fn on_creating(&self, resource: &R, status: &Status) -> Result<Vec<Command>, EngineError> {
        if status.version.is_empty() {
            return Ok(precondition_failed(
                resource,
                status,
                "creating resource with empty version",
            ));
        }

        let workflows = self.workflows(resource, Operation::Create).await?;
        Ok(set_state_if_provider_finished(
            resource,
            status,
            workflows,
            IdVerifier::SUCCEED_FOR_NON_EMPTY_ID,
        ))
    }

    async fn on_updating(&self, resource: &R, status: &Status) -> Result<Vec<Command>, EngineError> {
        if status.version.is_empty() || status.provider.id.is_empty() {
            return Ok(precondition_failed(
                resource,
                status,
                "updating resource with empty version or providerId",
            ));
        }

        let workflows = self.workflows(resource, Operation::Update).await?;
        Ok(set_state_if_provider_finished(
            resource,
            status,
            workflows,
            IdVerifier::SUCCEED_FOR_NON_EMPTY_ID,
        ))
    }

    async fn workflows(&self, resource: &R, operation: Operation) -> Result<Vec<Workflow>, EngineError> {
        Ok(self
            .repository
            .get_by_labels(&WorkflowLabels::for_resource(resource, operation))
            .await?)
    }

    /// Move to `target` and start `operation`, or to `failure` if its workflow cannot be built
    ///
    /// A workflow still running for the same operation is adopted instead of
    /// starting another. The list read can lag a create from the previous
    /// pass, so two workflows remain possible; the newest one decides.
    async fn begin(
        &self,
        provider: &Provider,
        resource: &R,
        operation: Operation,
        target: SetStatus,
        failure: SetStatus,
    ) -> Result<Vec<Command>, EngineError> {
        let existing = self.workflows(resource, operation).await?;
        if latest_workflow_by_phase(&existing).in_progress.is_some() {
            info!(
                resource = %resource.namespaced_name(),
                %operation,
                "workflow already in progress, not creating another"
            );
            return Ok(vec![target.into()]);
        }

        let constructed = match operation {
            Operation::Create => self.factory.construct_creation_workflow(provider, resource),
            Operation::Update => self.factory.construct_update_workflow(provider, resource),
            Operation::Delete => self.factory.construct_deletion_workflow(provider, resource),
        };

        match constructed {
            Ok(workflow) => Ok(vec![
                target.into(),
                Command::CreateWorkflow(Box::new(workflow)),
            ]),
            Err(e) => {
                let message = e.failure_message();
                error!(
                    resource = %resource.namespaced_name(),
                    %operation,
                    error = %e,
                    "{}, failing resource", message
                );
                Ok(vec![failure.with_message(message).into()])
            }
        }
    }
}

/// Nothing was created upstream, so deletion completes immediately
fn deleted(status: &Status) -> Command {
    SetStatus::from_status(status.clone())
        .with_state(SynchronizationState::Deleted)
        .into()
}

fn precondition_failed<R: Resource>(resource: &R, status: &Status, message: &str) -> Vec<Command> {
    info!(resource = %resource.namespaced_name(), "{}, failing resource", message);
    vec![SetStatus::from_status(status.clone())
        .with_state(SynchronizationState::Failed)
        .with_message(message)
        .into()]
}

/// Fold the outcome of an operation's workflows into the status
///
/// Waits while any workflow is in progress. Otherwise the newest succeeded
/// workflow decides, and all workflows are handed back for cleanup.
fn set_state_if_provider_finished<R: Resource>(
    resource: &R,
    status: &Status,
    workflows: Vec<Workflow>,
    verifier: IdVerifier,
) -> Vec<Command> {
    let name = resource.namespaced_name();
    let latest = latest_workflow_by_phase(&workflows);

    if latest.in_progress.is_some() {
        debug!(resource = %name, "operation in progress");
        return Vec::new();
    }

    let failed = |message: &str| {
        SetStatus::from_status(status.clone())
            .with_state(verifier.failure_state)
            .with_message(message)
    };

    let set_status = match (latest.succeeded, latest.failed) {
        (Some(succeeded), _) => {
            info!(resource = %name, "operation succeeded");
            match provider_output(succeeded) {
                Err(e) => {
                    error!(resource = %name, error = %e, "could not retrieve workflow output, failing resource");
                    failed("could not retrieve workflow output")
                }
                Ok(output) if !output.provider_error.is_empty() => {
                    error!(resource = %name, provider_error = %output.provider_error, "provider reported an error, failing resource");
                    failed(&output.provider_error).with_provider_id(output.id)
                }
                Ok(output) => match verifier.verify(&output.id) {
                    Err(message) => {
                        error!(resource = %name, "{}, failing resource", message);
                        failed(message)
                    }
                    Ok(()) => SetStatus::from_status(status.clone())
                        .with_state(verifier.success_state)
                        .with_provider_id(output.id),
                },
            }
        }
        (None, Some(_)) => {
            info!(resource = %name, "operation failed, failing resource");
            failed("operation failed")
        }
        (None, None) => {
            info!(resource = %name, "operation progress unknown, failing resource");
            failed("operation progress unknown")
        }
    };

    vec![set_status.into(), Command::DeleteWorkflows(workflows)]
}
