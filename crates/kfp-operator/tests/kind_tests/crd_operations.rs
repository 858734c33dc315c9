//! Integration tests for CRD operations
//!
//! These tests tell the story of how pipeline authors write resources through
//! the Kubernetes API and what the served schema does with them.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use kfp_common::crd::{
    NamespacedName, OnChangeType, Parameter, Pipeline, PipelineFramework, PipelineIdentifier,
    PipelineSpec, Run, RunConfiguration, RunConfigurationSpec, RunSpec, Schedule, Triggers,
};

use super::helpers::{ensure_test_cluster, TEST_NAMESPACE};

// =============================================================================
// Test Fixtures
// =============================================================================

fn sample_pipeline(name: &str) -> Pipeline {
    let mut pipeline = Pipeline::new(
        name,
        PipelineSpec {
            image: "ghcr.io/acme/fraud-pipeline:1.4.0".to_string(),
            framework: PipelineFramework {
                name: "tfx".to_string(),
                parameters: [(
                    "components".to_string(),
                    serde_json::json!("fraud.components"),
                )]
                .into(),
            },
            ..Default::default()
        },
    );
    pipeline.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    pipeline
}

async fn cleanup<K>(client: &Client, name: &str)
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
{
    let api: Api<K> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}

// =============================================================================
// Pipeline Stories
// =============================================================================

/// Story: A pipeline author registers a pipeline
///
/// Expected behavior:
/// - The Pipeline is stored with its image and framework parameters
/// - No status exists until a controller synchronizes it
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_author_registers_pipeline() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<Pipeline> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "fraud-detection";

    cleanup::<Pipeline>(&client, name).await;

    api.create(&PostParams::default(), &sample_pipeline(name))
        .await
        .expect("failed to create pipeline");

    let fetched = api.get(name).await.expect("failed to get pipeline");
    assert_eq!(fetched.spec.image, "ghcr.io/acme/fraud-pipeline:1.4.0");
    assert_eq!(fetched.spec.framework.name, "tfx");
    assert_eq!(
        fetched.spec.framework.parameters["components"],
        serde_json::json!("fraud.components")
    );
    assert!(fetched.status.is_none());

    cleanup::<Pipeline>(&client, name).await;
}

// =============================================================================
// Run Stories
// =============================================================================

/// Story: A data scientist submits a run fed by another RunConfiguration
///
/// Expected behavior:
/// - The pinned pipeline reference survives as `name:version`
/// - Literal and artifact-sourced parameters are stored as written
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_scientist_submits_run_with_upstream_artifact() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<Run> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "train-once";

    cleanup::<Run>(&client, name).await;

    let mut run = Run::new(
        name,
        RunSpec {
            provider: NamespacedName::new("kfp-operator-system", "vertex"),
            pipeline: PipelineIdentifier::versioned("fraud-detection", "1.4.0-abc123"),
            parameters: vec![
                Parameter::literal("epochs", "10"),
                Parameter::from_run_configuration(
                    "features",
                    NamespacedName::new("", "feature-build"),
                    "table",
                    true,
                ),
            ],
            ..Default::default()
        },
    );
    run.metadata.namespace = Some(TEST_NAMESPACE.to_string());

    api.create(&PostParams::default(), &run)
        .await
        .expect("failed to create run");

    let fetched = api.get(name).await.expect("failed to get run");
    assert_eq!(
        fetched.spec.pipeline,
        PipelineIdentifier::versioned("fraud-detection", "1.4.0-abc123")
    );
    assert_eq!(fetched.spec.parameters, run.spec.parameters);

    cleanup::<Run>(&client, name).await;
}

// =============================================================================
// RunConfiguration Stories
// =============================================================================

/// Story: A team schedules nightly retraining that also fires on new pipelines
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_team_configures_nightly_retraining() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<RunConfiguration> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "nightly-retrain";

    cleanup::<RunConfiguration>(&client, name).await;

    let mut rc = RunConfiguration::new(
        name,
        RunConfigurationSpec {
            run: RunSpec {
                pipeline: PipelineIdentifier::unversioned("fraud-detection"),
                ..Default::default()
            },
            triggers: Triggers {
                schedules: vec![Schedule {
                    cron_expression: "0 2 * * *".to_string(),
                    ..Default::default()
                }],
                on_change: vec![OnChangeType::Pipeline],
                ..Default::default()
            },
        },
    );
    rc.metadata.namespace = Some(TEST_NAMESPACE.to_string());

    api.create(&PostParams::default(), &rc)
        .await
        .expect("failed to create run configuration");

    let fetched = api.get(name).await.expect("failed to get run configuration");
    assert_eq!(fetched.spec.triggers, rc.spec.triggers);

    cleanup::<RunConfiguration>(&client, name).await;
}

/// Story: kubectl shows synchronization state for every kind
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_kubectl_shows_synchronization_state() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let crds: Api<CustomResourceDefinition> = Api::all(client);

    for name in [
        "pipelines.pipelines.kubeflow.org",
        "experiments.pipelines.kubeflow.org",
        "runs.pipelines.kubeflow.org",
        "runconfigurations.pipelines.kubeflow.org",
        "runschedules.pipelines.kubeflow.org",
        "providers.pipelines.kubeflow.org",
    ] {
        let crd = crds.get(name).await.expect("CRD should be installed");
        let columns: Vec<String> = crd.spec.versions[0]
            .additional_printer_columns
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert!(
            columns.iter().any(|c| c == "SynchronizationState"),
            "{name} should print its synchronization state, got {columns:?}"
        );
    }
}
