//! Provider controller
//!
//! Deploys each Provider's service as an owned Deployment and ClusterIP
//! Service, both named `provider-{name}`.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Resource as _, ResourceExt};
use tracing::{info, instrument, warn};

use kfp_common::config::ControllerConfig;
use kfp_common::crd::{Provider, SynchronizationState};
use kfp_common::metrics::ReconcileTimer;
use kfp_common::Resource;
use kfp_engine::SetStatus;

use crate::error::ReconcileError;
use crate::reconciler::Context;

/// Label selecting a provider's pods
pub const APP_LABEL: &str = "app";

/// Environment variable carrying the provider name
pub const PROVIDER_NAME_ENV: &str = "PROVIDERNAME";

/// Prefix of environment variables carrying provider parameters
pub const PARAMETERS_ENV_PREFIX: &str = "PARAMETERS_";

/// Reconcile a Provider
#[instrument(skip(provider, ctx), fields(resource = %provider.namespaced_name()))]
pub async fn reconcile(
    provider: Arc<Provider>,
    ctx: Arc<Context<Provider>>,
) -> Result<Action, ReconcileError> {
    let timer = ReconcileTimer::start(Provider::KIND);
    let result = reconcile_provider(provider.as_ref(), &ctx).await;
    match &result {
        Ok(_) => timer.success(),
        Err(_) => timer.error(),
    }
    result
}

async fn reconcile_provider(
    provider: &Provider,
    ctx: &Context<Provider>,
) -> Result<Action, ReconcileError> {
    if provider.deletion_requested() {
        return Ok(Action::await_change());
    }

    let deployment = match construct_deployment(provider, &ctx.config) {
        Ok(deployment) => deployment,
        Err(e) => {
            warn!(resource = %provider.namespaced_name(), error = %e, "unable to construct provider deployment");
            set_state(provider, ctx, SynchronizationState::Failed, &e.to_string()).await?;
            return Ok(Action::await_change());
        }
    };
    let service = construct_service(provider, &ctx.config);

    if let Err(e) = ctx.kfp.apply_provider_service(&deployment, &service).await {
        set_state(
            provider,
            ctx,
            SynchronizationState::Failed,
            "unable to apply provider service",
        )
        .await?;
        return Err(e);
    }

    set_state(provider, ctx, SynchronizationState::Succeeded, "").await?;
    Ok(Action::await_change())
}

/// Write the state unless it is already recorded for this generation
async fn set_state(
    provider: &Provider,
    ctx: &Context<Provider>,
    state: SynchronizationState,
    message: &str,
) -> Result<(), ReconcileError> {
    let current = provider.sync_status();
    if current.synchronization_state == state
        && current.observed_generation == provider.generation()
    {
        return Ok(());
    }

    info!(resource = %provider.namespaced_name(), %state, "provider service reconciled");
    let mut status = current;
    status.synchronization_state = state;
    status.observed_generation = provider.generation();
    ctx.executor
        .execute(
            provider,
            vec![SetStatus::from_status(status).with_message(message).into()],
        )
        .await?;
    Ok(())
}

fn selector_labels(provider: &Provider) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), provider.service_name())])
}

fn owned_metadata(provider: &Provider, config: &ControllerConfig) -> ObjectMeta {
    let mut labels = config.default_provider_values.labels.clone();
    labels.extend(selector_labels(provider));
    ObjectMeta {
        name: Some(provider.service_name()),
        namespace: provider.namespace(),
        labels: Some(labels),
        owner_references: provider.controller_owner_ref(&()).map(|r| vec![r]),
        ..Default::default()
    }
}

/// Parameter value as passed to the service; strings are passed unquoted
fn parameter_env_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn service_env(provider: &Provider) -> Vec<EnvVar> {
    let name = EnvVar {
        name: PROVIDER_NAME_ENV.to_string(),
        value: Some(provider.name_any()),
        ..Default::default()
    };
    let parameters = provider.spec.parameters.iter().map(|(key, value)| EnvVar {
        name: format!("{PARAMETERS_ENV_PREFIX}{}", key.to_uppercase()),
        value: Some(parameter_env_value(value)),
        ..Default::default()
    });
    std::iter::once(name).chain(parameters).collect()
}

/// Pod template with the service container populated
///
/// Without a configured template a single service container is used; a
/// configured template must contain the service container.
fn pod_template(
    provider: &Provider,
    config: &ControllerConfig,
) -> Result<PodTemplateSpec, ReconcileError> {
    let values = &config.default_provider_values;
    let mut template = values
        .pod_template_spec
        .clone()
        .unwrap_or_else(|| PodTemplateSpec {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: values.service_container_name.clone(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        });

    let spec = template.spec.get_or_insert_with(PodSpec::default);
    let container = spec
        .containers
        .iter_mut()
        .find(|c| c.name == values.service_container_name)
        .ok_or_else(|| {
            ReconcileError::Config(format!(
                "container with name {} not found on pod template",
                values.service_container_name
            ))
        })?;
    container.image = Some(provider.spec.service_image.clone());
    container
        .env
        .get_or_insert_with(Vec::new)
        .extend(service_env(provider));
    if !provider.spec.service_account.is_empty() {
        spec.service_account_name = Some(provider.spec.service_account.clone());
    }

    let metadata = template.metadata.get_or_insert_with(ObjectMeta::default);
    metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(selector_labels(provider));

    Ok(template)
}

/// Deployment running the provider service
pub fn construct_deployment(
    provider: &Provider,
    config: &ControllerConfig,
) -> Result<Deployment, ReconcileError> {
    Ok(Deployment {
        metadata: owned_metadata(provider, config),
        spec: Some(DeploymentSpec {
            replicas: Some(config.default_provider_values.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(provider)),
                ..Default::default()
            },
            template: pod_template(provider, config)?,
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn tcp_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// ClusterIP Service in front of the provider service
pub fn construct_service(provider: &Provider, config: &ControllerConfig) -> Service {
    let values = &config.default_provider_values;
    Service {
        metadata: owned_metadata(provider, config),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(provider)),
            ports: Some(vec![
                tcp_port("http", values.service_port),
                tcp_port("metrics", values.metrics_port),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
