//! Dependency observation for Runs and RunConfigurations
//!
//! A dependant records the pipeline version and the latest succeeded runs of
//! the RunConfigurations it references in its own status. Those observations
//! feed the run version and parameter resolution, so they are refreshed
//! before the resource is synchronized.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::debug;

use kfp_common::crd::{
    Dependencies, NamespacedName, Pipeline, Run, RunConfiguration, RunReference, RunSpec,
    SynchronizationState,
};
use kfp_common::Resource;

use crate::client::KfpClient;
use crate::error::ReconcileError;

/// A resource whose run spec depends on pipelines and RunConfigurations
pub trait Dependent: Resource {
    /// The run spec
    fn run_spec(&self) -> &RunSpec;

    /// RunConfigurations that trigger this resource without supplying artifacts
    fn trigger_run_configurations(&self) -> &[NamespacedName] {
        &[]
    }

    /// Dependencies recorded in status
    fn observed_dependencies(&self) -> Dependencies;

    /// Every referenced RunConfiguration, resolved into this namespace
    fn dependency_names(&self) -> BTreeSet<NamespacedName> {
        let namespace = self.namespace().unwrap_or_default();
        self.run_spec()
            .referenced_artifacts()
            .map(|r| &r.name)
            .chain(self.trigger_run_configurations())
            .map(|name| name.clone().or_namespace(&namespace))
            .collect()
    }
}

impl Dependent for Run {
    fn run_spec(&self) -> &RunSpec {
        &self.spec
    }

    fn observed_dependencies(&self) -> Dependencies {
        self.dependencies()
    }
}

impl Dependent for RunConfiguration {
    fn run_spec(&self) -> &RunSpec {
        &self.spec.run
    }

    fn trigger_run_configurations(&self) -> &[NamespacedName] {
        &self.spec.triggers.run_configurations
    }

    fn observed_dependencies(&self) -> Dependencies {
        self.rc_status().dependencies
    }
}

/// Pipeline version to record, `None` while the pipeline is settling
///
/// A pinned version is used as is. Otherwise a succeeded pipeline yields its
/// version, and a deleted or missing one an empty version.
pub async fn observe_pipeline_version<R: Dependent>(
    kfp: &dyn KfpClient,
    resource: &R,
) -> Result<Option<String>, ReconcileError> {
    let pipeline = &resource.run_spec().pipeline;
    if !pipeline.version.is_empty() {
        return Ok(Some(pipeline.version.clone()));
    }

    let name = NamespacedName::new(resource.namespace().unwrap_or_default(), &pipeline.name);
    let Some(found) = kfp.get_pipeline(&name).await? else {
        debug!(resource = %resource.namespaced_name(), pipeline = %name, "pipeline not found");
        return Ok(Some(String::new()));
    };

    let status = found.sync_status();
    Ok(match status.synchronization_state {
        SynchronizationState::Succeeded => Some(status.version),
        SynchronizationState::Deleted => Some(String::new()),
        _ => None,
    })
}

/// Latest succeeded run of every referenced RunConfiguration
///
/// Entries are keyed by the reference as written and carry only the
/// artifacts this resource asks for. A missing RunConfiguration yields an
/// empty reference.
pub async fn observe_run_configurations<R: Dependent>(
    kfp: &dyn KfpClient,
    resource: &R,
) -> Result<BTreeMap<String, RunReference>, ReconcileError> {
    let namespace = resource.namespace().unwrap_or_default();

    let mut wanted: BTreeMap<String, (NamespacedName, BTreeSet<String>)> = BTreeMap::new();
    for reference in resource.run_spec().referenced_artifacts() {
        wanted
            .entry(reference.name.to_string())
            .or_insert_with(|| (reference.name.clone(), BTreeSet::new()))
            .1
            .insert(reference.output_artifact.clone());
    }
    for name in resource.trigger_run_configurations() {
        wanted
            .entry(name.to_string())
            .or_insert_with(|| (name.clone(), BTreeSet::new()));
    }

    let mut observed = BTreeMap::new();
    for (key, (name, artifacts)) in wanted {
        let name = name.or_namespace(&namespace);
        let reference = match kfp.get_run_configuration(&name).await? {
            Some(rc) => {
                let succeeded = rc.rc_status().latest_runs.succeeded;
                RunReference {
                    provider_id: succeeded.provider_id,
                    artifacts: succeeded
                        .artifacts
                        .into_iter()
                        .filter(|a| artifacts.contains(&a.name))
                        .collect(),
                }
            }
            None => {
                debug!(resource = %resource.namespaced_name(), run_configuration = %name, "dependency not found");
                RunReference::default()
            }
        };
        observed.insert(key, reference);
    }
    Ok(observed)
}

/// Dependencies as they should be recorded now
pub async fn desired_dependencies<R: Dependent>(
    kfp: &dyn KfpClient,
    resource: &R,
) -> Result<Dependencies, ReconcileError> {
    let mut dependencies = resource.observed_dependencies();
    if let Some(version) = observe_pipeline_version(kfp, resource).await? {
        dependencies.pipeline.version = version;
    }
    dependencies.run_configurations = observe_run_configurations(kfp, resource).await?;
    Ok(dependencies)
}

/// Dependants referencing `pipeline` by name
pub fn referencing_pipeline<R: Dependent>(
    pipeline: &Pipeline,
    candidates: impl IntoIterator<Item = Arc<R>>,
) -> Vec<ObjectRef<R>> {
    let namespace = pipeline.namespace();
    let name = pipeline.name_any();
    candidates
        .into_iter()
        .filter(|c| c.namespace() == namespace && c.run_spec().pipeline.name == name)
        .map(|c| ObjectRef::from_obj(c.as_ref()))
        .collect()
}

/// Dependants referencing `run_configuration` by parameter or trigger
pub fn referencing_run_configuration<R: Dependent>(
    run_configuration: &RunConfiguration,
    candidates: impl IntoIterator<Item = Arc<R>>,
) -> Vec<ObjectRef<R>> {
    let name = run_configuration.namespaced_name();
    candidates
        .into_iter()
        .filter(|c| c.dependency_names().contains(&name))
        .map(|c| ObjectRef::from_obj(c.as_ref()))
        .collect()
}
