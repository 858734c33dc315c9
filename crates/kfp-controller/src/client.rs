//! Cluster reads and writes the reconcilers need beyond the engine
//!
//! Reads go straight to the API server rather than a reflector cache, so a
//! dependency written moments ago is seen by the next pass.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource as _, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use kfp_common::crd::{
    NamespacedName, Pipeline, Provider, Run, RunConfiguration, RunConfigurationStatus, RunSchedule,
    RunStatus,
};
use kfp_common::FIELD_MANAGER;

use crate::error::ReconcileError;

/// Kubernetes operations used by the reconcilers
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KfpClient: Send + Sync {
    /// Get a Provider, `None` when it does not exist
    async fn get_provider(&self, name: &NamespacedName) -> Result<Option<Provider>, ReconcileError>;

    /// Get a Pipeline, `None` when it does not exist
    async fn get_pipeline(&self, name: &NamespacedName) -> Result<Option<Pipeline>, ReconcileError>;

    /// Get a RunConfiguration, `None` when it does not exist
    async fn get_run_configuration(
        &self,
        name: &NamespacedName,
    ) -> Result<Option<RunConfiguration>, ReconcileError>;

    /// Merge `status` into a Run's status
    async fn patch_run_status(&self, run: &Run, status: &RunStatus) -> Result<(), ReconcileError>;

    /// Merge `status` into a RunConfiguration's status
    async fn patch_run_configuration_status(
        &self,
        run_configuration: &RunConfiguration,
        status: &RunConfigurationStatus,
    ) -> Result<(), ReconcileError>;

    /// RunSchedules controlled by `owner`
    async fn list_owned_run_schedules(
        &self,
        owner: &RunConfiguration,
    ) -> Result<Vec<RunSchedule>, ReconcileError>;

    /// Runs controlled by `owner`
    async fn list_owned_runs(&self, owner: &RunConfiguration) -> Result<Vec<Run>, ReconcileError>;

    /// Create a RunSchedule
    async fn create_run_schedule(&self, schedule: &RunSchedule) -> Result<(), ReconcileError>;

    /// Delete a RunSchedule
    async fn delete_run_schedule(&self, schedule: &RunSchedule) -> Result<(), ReconcileError>;

    /// Create a Run
    async fn create_run(&self, run: &Run) -> Result<(), ReconcileError>;

    /// Server-side apply a provider's Deployment and Service
    async fn apply_provider_service(
        &self,
        deployment: &Deployment,
        service: &Service,
    ) -> Result<(), ReconcileError>;
}

/// [`KfpClient`] backed by the Kubernetes API
pub struct KubeKfpClient {
    client: Client,
}

impl KubeKfpClient {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Objects controlled by `owner`
fn controlled_by<K: kube::Resource>(objects: Vec<K>, owner: &RunConfiguration) -> Vec<K> {
    let uid = owner.uid();
    objects
        .into_iter()
        .filter(|o| {
            o.meta()
                .owner_references
                .iter()
                .flatten()
                .any(|r| r.controller == Some(true) && Some(&r.uid) == uid.as_ref())
        })
        .collect()
}

fn ignore_not_found<T>(result: Result<T, kube::Error>) -> Result<(), ReconcileError> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl KfpClient for KubeKfpClient {
    async fn get_provider(&self, name: &NamespacedName) -> Result<Option<Provider>, ReconcileError> {
        Ok(self.api(&name.namespace).get_opt(&name.name).await?)
    }

    async fn get_pipeline(&self, name: &NamespacedName) -> Result<Option<Pipeline>, ReconcileError> {
        Ok(self.api(&name.namespace).get_opt(&name.name).await?)
    }

    async fn get_run_configuration(
        &self,
        name: &NamespacedName,
    ) -> Result<Option<RunConfiguration>, ReconcileError> {
        Ok(self.api(&name.namespace).get_opt(&name.name).await?)
    }

    async fn patch_run_status(&self, run: &Run, status: &RunStatus) -> Result<(), ReconcileError> {
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": run.resource_version() },
            "status": status
        });
        let api: Api<Run> = self.api(&run.namespace().unwrap_or_default());
        api.patch_status(
            &run.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn patch_run_configuration_status(
        &self,
        run_configuration: &RunConfiguration,
        status: &RunConfigurationStatus,
    ) -> Result<(), ReconcileError> {
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": run_configuration.resource_version() },
            "status": status
        });
        let api: Api<RunConfiguration> =
            self.api(&run_configuration.namespace().unwrap_or_default());
        api.patch_status(
            &run_configuration.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn list_owned_run_schedules(
        &self,
        owner: &RunConfiguration,
    ) -> Result<Vec<RunSchedule>, ReconcileError> {
        let api: Api<RunSchedule> = self.api(&owner.namespace().unwrap_or_default());
        let list = api.list(&ListParams::default()).await?;
        Ok(controlled_by(list.items, owner))
    }

    async fn list_owned_runs(&self, owner: &RunConfiguration) -> Result<Vec<Run>, ReconcileError> {
        let api: Api<Run> = self.api(&owner.namespace().unwrap_or_default());
        let list = api.list(&ListParams::default()).await?;
        Ok(controlled_by(list.items, owner))
    }

    async fn create_run_schedule(&self, schedule: &RunSchedule) -> Result<(), ReconcileError> {
        let api: Api<RunSchedule> = self.api(&schedule.namespace().unwrap_or_default());
        let created = api.create(&PostParams::default(), schedule).await?;
        debug!(run_schedule = %created.name_any(), "created run schedule");
        Ok(())
    }

    async fn delete_run_schedule(&self, schedule: &RunSchedule) -> Result<(), ReconcileError> {
        let api: Api<RunSchedule> = self.api(&schedule.namespace().unwrap_or_default());
        ignore_not_found(
            api.delete(&schedule.name_any(), &DeleteParams::background())
                .await,
        )
    }

    async fn create_run(&self, run: &Run) -> Result<(), ReconcileError> {
        let api: Api<Run> = self.api(&run.namespace().unwrap_or_default());
        let created = api.create(&PostParams::default(), run).await?;
        debug!(run = %created.name_any(), "created run");
        Ok(())
    }

    async fn apply_provider_service(
        &self,
        deployment: &Deployment,
        service: &Service,
    ) -> Result<(), ReconcileError> {
        let params = PatchParams::apply(FIELD_MANAGER).force();

        let deployments: Api<Deployment> = self.api(&deployment.namespace().unwrap_or_default());
        deployments
            .patch(&deployment.name_any(), &params, &Patch::Apply(deployment))
            .await?;

        let services: Api<Service> = self.api(&service.namespace().unwrap_or_default());
        services
            .patch(&service.name_any(), &params, &Patch::Apply(service))
            .await?;

        debug!(deployment = %deployment.name_any(), "applied provider service");
        Ok(())
    }
}
