//! Controller runner
//!
//! Each `build_*` function returns the controller futures for one concern;
//! the binary joins them all.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use kfp_common::config::ControllerConfig;
use kfp_common::crd::{Experiment, Pipeline, Provider, Run, RunConfiguration, RunSchedule};
use kfp_common::events::{EventPublisher, KubeEventPublisher};
use kfp_common::{Resource, ResourceKind};
use kfp_controller::dependencies::{referencing_pipeline, referencing_run_configuration};
use kfp_controller::{
    error_policy, provider_controller, reconciler, run, run_configuration, workflow_owner, Context,
    SyncContext,
};
use kfp_workflow::labels::OWNER_KIND_LABEL;
use kfp_workflow::{Workflow, WorkflowResource};

/// Watcher timeout (seconds), kept below the client read timeout of 30s
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Name events are reported under
const CONTROLLER_NAME: &str = "kfp-operator";

/// A running controller
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Workflows in the workflow namespace labelled as owned by `kind`
fn owned_workflows(
    client: &Client,
    config: &ControllerConfig,
    kind: ResourceKind,
) -> (Api<Workflow>, WatcherConfig) {
    (
        Api::namespaced(client.clone(), &config.workflow_namespace),
        watcher_config().labels(&format!("{OWNER_KIND_LABEL}={kind}")),
    )
}

/// Every controller the operator runs
pub fn build_controllers(client: Client, config: Arc<ControllerConfig>) -> Vec<ControllerFuture> {
    let events: Arc<dyn EventPublisher> =
        Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME));

    tracing::info!("Starting controllers:");
    vec![
        build_workflow_controller::<Pipeline>(client.clone(), config.clone(), events.clone()),
        build_workflow_controller::<Experiment>(client.clone(), config.clone(), events.clone()),
        build_workflow_controller::<RunSchedule>(client.clone(), config.clone(), events.clone()),
        build_run_controller(client.clone(), config.clone(), events.clone()),
        build_run_configuration_controller(client.clone(), config.clone(), events.clone()),
        build_provider_controller(client, config, events),
    ]
}

/// Controller for a kind synchronized purely through workflows
pub fn build_workflow_controller<R: WorkflowResource>(
    client: Client,
    config: Arc<ControllerConfig>,
    events: Arc<dyn EventPublisher>,
) -> ControllerFuture {
    let (workflows, workflow_watch) = owned_workflows(&client, &config, R::KIND);
    let ctx = Arc::new(SyncContext::<R>::new(client.clone(), config, events));

    tracing::info!("- {} controller", R::KIND.kind_name());
    Box::pin(
        Controller::new(Api::<R>::all(client), watcher_config())
            .watches(workflows, workflow_watch, |workflow| {
                workflow_owner::<R>(&workflow)
            })
            .shutdown_on_signal()
            .run(reconciler::reconcile::<R>, error_policy::<R, SyncContext<R>>, ctx)
            .for_each(log_reconcile_result(R::KIND.kind_name())),
    )
}

/// Run controller, also woken by the pipelines and RunConfigurations runs depend on
pub fn build_run_controller(
    client: Client,
    config: Arc<ControllerConfig>,
    events: Arc<dyn EventPublisher>,
) -> ControllerFuture {
    let (workflows, workflow_watch) = owned_workflows(&client, &config, Run::KIND);
    let ctx = Arc::new(SyncContext::<Run>::new(client.clone(), config, events));

    let controller = Controller::new(Api::<Run>::all(client.clone()), watcher_config());
    let runs = controller.store();
    let runs_for_rc = runs.clone();

    tracing::info!("- Run controller");
    Box::pin(
        controller
            .watches(workflows, workflow_watch, |workflow| {
                workflow_owner::<Run>(&workflow)
            })
            .watches(
                Api::<Pipeline>::all(client.clone()),
                watcher_config(),
                move |pipeline| referencing_pipeline(&pipeline, runs.state()),
            )
            .watches(
                Api::<RunConfiguration>::all(client),
                watcher_config(),
                move |rc| referencing_run_configuration(&rc, runs_for_rc.state()),
            )
            .shutdown_on_signal()
            .run(run::reconcile, error_policy::<Run, SyncContext<Run>>, ctx)
            .for_each(log_reconcile_result("Run")),
    )
}

/// RunConfiguration controller, owning its RunSchedules
pub fn build_run_configuration_controller(
    client: Client,
    config: Arc<ControllerConfig>,
    events: Arc<dyn EventPublisher>,
) -> ControllerFuture {
    let ctx = Arc::new(Context::<RunConfiguration>::new(
        client.clone(),
        config,
        events,
    ));

    let controller = Controller::new(
        Api::<RunConfiguration>::all(client.clone()),
        watcher_config(),
    );
    let rcs = controller.store();
    let rcs_for_rc = rcs.clone();

    tracing::info!("- RunConfiguration controller");
    Box::pin(
        controller
            .owns(Api::<RunSchedule>::all(client.clone()), watcher_config())
            .watches(
                Api::<Pipeline>::all(client.clone()),
                watcher_config(),
                move |pipeline| referencing_pipeline(&pipeline, rcs.state()),
            )
            .watches(
                Api::<RunConfiguration>::all(client),
                watcher_config(),
                move |rc| referencing_run_configuration(&rc, rcs_for_rc.state()),
            )
            .shutdown_on_signal()
            .run(
                run_configuration::reconcile,
                error_policy::<RunConfiguration, Context<RunConfiguration>>,
                ctx,
            )
            .for_each(log_reconcile_result("RunConfiguration")),
    )
}

/// Provider controller, owning the provider service Deployment and Service
pub fn build_provider_controller(
    client: Client,
    config: Arc<ControllerConfig>,
    events: Arc<dyn EventPublisher>,
) -> ControllerFuture {
    let ctx = Arc::new(Context::<Provider>::new(client.clone(), config, events));

    tracing::info!("- Provider controller");
    Box::pin(
        Controller::new(Api::<Provider>::all(client.clone()), watcher_config())
            .owns(Api::<Deployment>::all(client.clone()), watcher_config())
            .owns(Api::<Service>::all(client), watcher_config())
            .shutdown_on_signal()
            .run(
                provider_controller::reconcile,
                error_policy::<Provider, Context<Provider>>,
                ctx,
            )
            .for_each(log_reconcile_result("Provider")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
