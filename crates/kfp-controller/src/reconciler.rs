//! Shared reconciler plumbing
//!
//! Pipelines, Experiments and RunSchedules are reconciled by [`reconcile`]
//! alone. Runs refresh their dependencies first and then call
//! [`synchronize`]; RunConfigurations and Providers only borrow the context
//! and error policy.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Client, ResourceExt};
use tracing::{debug, error, instrument, warn};

use kfp_common::config::ControllerConfig;
use kfp_common::events::EventPublisher;
use kfp_common::metrics::ReconcileTimer;
use kfp_common::Resource;
use kfp_engine::{Command, CommandExecutor, KubeResourceClient, StateHandler};
use kfp_workflow::{
    KubeWorkflowRepository, ResourceWorkflowFactory, Workflow, WorkflowLabels, WorkflowRepository,
    WorkflowResource,
};

use crate::client::{KfpClient, KubeKfpClient};
use crate::error::ReconcileError;
use crate::provider::{desired_provider, load_provider, LoadedProvider};

/// Requeue interval while an operation is in flight or the provider is missing
pub const IN_FLIGHT_REQUEUE: Duration = Duration::from_secs(60);

/// Requeue interval after an error
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue interval after a write conflict
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Shared context for every controller of kind `R`
pub struct Context<R> {
    /// Reads and writes beyond the engine
    pub kfp: Arc<dyn KfpClient>,
    /// Controller configuration
    pub config: Arc<ControllerConfig>,
    /// Executes commands against `R`
    pub executor: CommandExecutor<R>,
}

impl<R: Resource> Context<R> {
    /// Create a context backed by the Kubernetes API
    pub fn new(
        client: Client,
        config: Arc<ControllerConfig>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let repository = workflow_repository(&client, &config);
        Self::with_repository(client, config, events, repository)
    }

    fn with_repository(
        client: Client,
        config: Arc<ControllerConfig>,
        events: Arc<dyn EventPublisher>,
        repository: Arc<dyn WorkflowRepository>,
    ) -> Self {
        Self {
            kfp: Arc::new(KubeKfpClient::new(client.clone())),
            executor: CommandExecutor::new(
                Arc::new(KubeResourceClient::new(client)),
                repository,
                events,
            ),
            config,
        }
    }

    /// Create a context from parts
    pub fn from_parts(
        kfp: Arc<dyn KfpClient>,
        config: Arc<ControllerConfig>,
        executor: CommandExecutor<R>,
    ) -> Self {
        Self {
            kfp,
            config,
            executor,
        }
    }
}

fn workflow_repository(client: &Client, config: &ControllerConfig) -> Arc<dyn WorkflowRepository> {
    Arc::new(KubeWorkflowRepository::new(
        client.clone(),
        config.workflow_namespace.clone(),
    ))
}

/// Context for kinds synchronized through workflows
pub struct SyncContext<R> {
    /// Shared context
    pub base: Context<R>,
    /// State machine
    pub handler: StateHandler<R>,
}

impl<R: WorkflowResource> SyncContext<R> {
    /// Create a context backed by the Kubernetes API
    pub fn new(
        client: Client,
        config: Arc<ControllerConfig>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let repository = workflow_repository(&client, &config);
        let handler = StateHandler::new(
            Arc::new(ResourceWorkflowFactory::new(config.clone())),
            repository.clone(),
        );
        Self {
            base: Context::with_repository(client, config, events, repository),
            handler,
        }
    }
}

impl<R> SyncContext<R> {
    /// Create a context from parts
    pub fn from_parts(base: Context<R>, handler: StateHandler<R>) -> Self {
        Self { base, handler }
    }
}

/// Reconcile a workflow-backed resource
#[instrument(
    skip(resource, ctx),
    fields(kind = %R::KIND, resource = %resource.namespaced_name())
)]
pub async fn reconcile<R: WorkflowResource>(
    resource: Arc<R>,
    ctx: Arc<SyncContext<R>>,
) -> Result<Action, ReconcileError> {
    let timer = ReconcileTimer::start(R::KIND);
    let result = synchronize(resource.as_ref(), &ctx).await;
    match &result {
        Ok(_) => timer.success(),
        Err(_) => timer.error(),
    }
    result
}

/// Run one state machine pass against the desired provider
///
/// Without the provider, only passes that need none go ahead. In-flight
/// operations are retried untouched until the provider is back.
pub async fn synchronize<R: Resource>(
    resource: &R,
    ctx: &SyncContext<R>,
) -> Result<Action, ReconcileError> {
    let desired = desired_provider(resource, &ctx.base.config)?;
    let provider = match load_provider(ctx.base.kfp.as_ref(), resource, &desired).await? {
        LoadedProvider::Found(provider) => provider,
        LoadedProvider::Missing(report) => {
            if let Some(commands) = ctx.handler.state_transition_without_provider(resource) {
                let next = next_action(resource, &commands);
                ctx.base.executor.execute(resource, commands).await?;
                return Ok(next);
            }
            if let Some(set_status) = report {
                ctx.base
                    .executor
                    .execute(resource, vec![set_status.into()])
                    .await?;
            }
            return Ok(Action::requeue(IN_FLIGHT_REQUEUE));
        }
    };

    let commands = ctx.handler.state_transition(&provider, resource).await?;
    let next = next_action(resource, &commands);
    ctx.base.executor.execute(resource, commands).await?;
    Ok(next)
}

/// Requeue while an operation is in flight, otherwise wait for a change
fn next_action<R: Resource>(resource: &R, commands: &[Command]) -> Action {
    let state = commands
        .iter()
        .rev()
        .find_map(|c| match c {
            Command::SetStatus(s) => Some(s.status.synchronization_state),
            _ => None,
        })
        .unwrap_or_else(|| resource.sync_status().synchronization_state);

    if state.is_settled() {
        Action::await_change()
    } else {
        Action::requeue(IN_FLIGHT_REQUEUE)
    }
}

/// Error policy shared by every controller
pub fn error_policy<R: Resource, C>(
    resource: Arc<R>,
    error: &ReconcileError,
    _ctx: Arc<C>,
) -> Action {
    if error.is_conflict() {
        warn!(
            kind = %R::KIND,
            resource = %resource.namespaced_name(),
            "conflict writing resource, retrying"
        );
        return Action::requeue(CONFLICT_REQUEUE);
    }

    error!(
        ?error,
        kind = %R::KIND,
        resource = %resource.namespaced_name(),
        "reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}

/// Resource a workflow was created for
pub fn workflow_owner<R: Resource>(workflow: &Workflow) -> Option<ObjectRef<R>> {
    match WorkflowLabels::from_labels(workflow.labels()) {
        Ok(labels) if labels.owner_kind == R::KIND => Some(
            ObjectRef::new(&labels.owner.name).within(&labels.owner.namespace),
        ),
        Ok(_) => None,
        Err(e) => {
            debug!(workflow = %workflow.name_any(), error = %e, "workflow without owner labels");
            None
        }
    }
}
