//! Integration tests running controllers in-process
//!
//! Each story spawns the controller under test against the kind cluster,
//! writes resources the way a user would, and waits for the outcome.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};

use kfp_common::config::ControllerConfig;
use kfp_common::crd::{
    NamespacedName, PipelineIdentifier, Provider, ProviderSpec, RunConfiguration,
    RunConfigurationSpec, RunSchedule, RunSpec, Schedule, SynchronizationState, Triggers,
};
use kfp_common::events::{EventPublisher, NoopEventPublisher};
use kfp_operator::runner::{build_provider_controller, build_run_configuration_controller};

use super::helpers::{ensure_test_cluster, eventually, TEST_NAMESPACE};

const WAIT: Duration = Duration::from_secs(60);

fn spawn<F>(controller: F) -> tokio::task::JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(controller)
}

fn events() -> Arc<dyn EventPublisher> {
    Arc::new(NoopEventPublisher)
}

fn sample_provider(name: &str) -> Provider {
    let mut provider = Provider::new(
        name,
        ProviderSpec {
            service_image: "ghcr.io/kfp-operator/vertex-provider:0.7.0".to_string(),
            parameters: [("project".to_string(), serde_json::json!("ml-test"))].into(),
            ..Default::default()
        },
    );
    provider.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    provider
}

async fn owned_schedules(client: &Client, rc: &RunConfiguration) -> Vec<RunSchedule> {
    let api: Api<RunSchedule> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let uid = rc.uid();
    api.list(&ListParams::default())
        .await
        .map(|list| list.items)
        .unwrap_or_default()
        .into_iter()
        .filter(|s| {
            s.owner_references()
                .iter()
                .any(|o| o.controller == Some(true) && Some(&o.uid) == uid.as_ref())
        })
        .collect()
}

/// Story: A platform engineer registers a provider
///
/// Expected behavior:
/// - A Deployment and a Service named `provider-{name}` appear
/// - The provider reports Succeeded for its current generation
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_engineer_registers_provider() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let providers: Api<Provider> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "vertex-it";
    let _ = providers.delete(name, &DeleteParams::default()).await;

    let controller = spawn(build_provider_controller(
        client.clone(),
        Arc::new(ControllerConfig::default()),
        events(),
    ));

    providers
        .create(&PostParams::default(), &sample_provider(name))
        .await
        .expect("failed to create provider");

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let deployment = eventually(WAIT, || async {
        deployments.get_opt("provider-vertex-it").await.ok().flatten()
    })
    .await
    .expect("provider deployment should be created");
    let container = &deployment.spec.unwrap().template.spec.unwrap().containers[0];
    assert_eq!(
        container.image.as_deref(),
        Some("ghcr.io/kfp-operator/vertex-provider:0.7.0")
    );

    let services: Api<Service> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    assert!(services.get_opt("provider-vertex-it").await.unwrap().is_some());

    let synced = eventually(WAIT, || async {
        let provider = providers.get(name).await.ok()?;
        let status = provider.status?;
        (status.synchronization_state == SynchronizationState::Succeeded).then_some(status)
    })
    .await
    .expect("provider should be synchronized");
    assert_eq!(synced.observed_generation, 1);

    controller.abort();
    let _ = providers.delete(name, &DeleteParams::default()).await;
}

/// Story: A team schedules a pinned pipeline twice a day
///
/// Expected behavior:
/// - One owned RunSchedule per schedule appears, pinned to the version
/// - Dropping a schedule deletes its RunSchedule
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_team_schedules_pinned_pipeline() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let rcs: Api<RunConfiguration> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "twice-daily";
    let _ = rcs.delete(name, &DeleteParams::default()).await;

    let controller = spawn(build_run_configuration_controller(
        client.clone(),
        Arc::new(ControllerConfig::default()),
        events(),
    ));

    let schedule = |cron: &str| Schedule {
        cron_expression: cron.to_string(),
        ..Default::default()
    };
    let mut rc = RunConfiguration::new(
        name,
        RunConfigurationSpec {
            run: RunSpec {
                provider: NamespacedName::new("kfp-operator-system", "vertex"),
                pipeline: PipelineIdentifier::versioned("fraud-detection", "1.4.0-abc123"),
                ..Default::default()
            },
            triggers: Triggers {
                schedules: vec![schedule("0 6 * * *"), schedule("0 18 * * *")],
                ..Default::default()
            },
        },
    );
    rc.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    let created = rcs
        .create(&PostParams::default(), &rc)
        .await
        .expect("failed to create run configuration");

    let schedules = eventually(WAIT, || async {
        let owned = owned_schedules(&client, &created).await;
        (owned.len() == 2).then_some(owned)
    })
    .await
    .expect("two run schedules should be created");
    assert!(schedules.iter().all(|s| s.spec.pipeline
        == PipelineIdentifier::versioned("fraud-detection", "1.4.0-abc123")));

    let mut updated = rcs.get(name).await.expect("failed to get run configuration");
    updated.spec.triggers.schedules = vec![schedule("0 6 * * *")];
    rcs.replace(name, &PostParams::default(), &updated)
        .await
        .expect("failed to update run configuration");

    let remaining = eventually(WAIT, || async {
        let live: Vec<RunSchedule> = owned_schedules(&client, &created)
            .await
            .into_iter()
            .filter(|s| s.metadata.deletion_timestamp.is_none())
            .collect();
        (live.len() == 1).then_some(live)
    })
    .await
    .expect("the dropped schedule should be deleted");
    assert_eq!(remaining[0].spec.schedule.cron_expression, "0 6 * * *");

    controller.abort();
    let _ = rcs.delete(name, &DeleteParams::default()).await;
}
