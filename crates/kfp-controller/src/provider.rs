//! Desired provider resolution and provider loading

use kube::ResourceExt;
use tracing::warn;

use kfp_common::config::ControllerConfig;
use kfp_common::crd::{NamespacedName, Provider, SynchronizationState};
use kfp_common::{Resource, PROVIDER_ANNOTATION};
use kfp_engine::SetStatus;

use crate::client::KfpClient;
use crate::error::ReconcileError;

/// Message written when the desired provider does not exist
pub const PROVIDER_NOT_FOUND: &str = "provider not found";

/// Provider a resource should be synchronized with
///
/// The provider annotation wins over `spec.provider`, which wins over the
/// controller default. Unqualified names resolve in the resource's namespace.
pub fn desired_provider<R: Resource>(
    resource: &R,
    config: &ControllerConfig,
) -> Result<NamespacedName, ReconcileError> {
    let namespace = resource.namespace().unwrap_or_default();

    if let Some(annotated) = resource.annotations().get(PROVIDER_ANNOTATION) {
        let name: NamespacedName = annotated
            .parse()
            .map_err(ReconcileError::InvalidProvider)?;
        return Ok(name.or_namespace(&namespace));
    }

    match resource.spec_provider() {
        Some(provider) if !provider.is_empty() => Ok(provider.clone().or_namespace(&namespace)),
        _ => {
            let name: NamespacedName = config
                .default_provider
                .parse()
                .map_err(ReconcileError::InvalidProvider)?;
            Ok(name.or_namespace(&namespace))
        }
    }
}

/// Outcome of loading a resource's provider
#[derive(Debug)]
pub enum LoadedProvider {
    /// The provider exists
    Found(Provider),
    /// The provider is missing; the status to report, if any
    ///
    /// Only settled resources are reported, and deleting ones only while
    /// nothing exists upstream. An in-flight operation keeps its state so its
    /// workflow result can still be folded in once the provider is back.
    Missing(Option<SetStatus>),
}

/// Load the desired provider
///
/// A missing provider is a reportable state rather than an error, so the
/// resource shows why it is stuck instead of crash-looping.
pub async fn load_provider<R: Resource>(
    kfp: &dyn KfpClient,
    resource: &R,
    desired: &NamespacedName,
) -> Result<LoadedProvider, ReconcileError> {
    if let Some(provider) = kfp.get_provider(desired).await? {
        return Ok(LoadedProvider::Found(provider));
    }

    warn!(
        resource = %resource.namespaced_name(),
        provider = %desired,
        "provider not found"
    );
    Ok(LoadedProvider::Missing(provider_not_found(resource)))
}

fn provider_not_found<R: Resource>(resource: &R) -> Option<SetStatus> {
    let status = resource.sync_status();
    let reportable = matches!(
        status.synchronization_state,
        SynchronizationState::Unknown
            | SynchronizationState::Succeeded
            | SynchronizationState::Failed
    ) && (!resource.deletion_requested() || status.provider.id.is_empty());
    if !reportable {
        return None;
    }

    let reported = status.synchronization_state == SynchronizationState::Failed
        && status
            .synchronized_condition()
            .is_some_and(|c| c.message == PROVIDER_NOT_FOUND);
    (!reported).then(|| {
        let mut status = status;
        status.observed_generation = resource.generation();
        SetStatus::from_status(status)
            .with_state(SynchronizationState::Failed)
            .with_message(PROVIDER_NOT_FOUND)
    })
}
