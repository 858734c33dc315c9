//! Workflow repository
//!
//! All reads are live list calls against the API server. A workflow created
//! in the previous reconcile may not be visible yet; callers must tolerate
//! that.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use kfp_common::FIELD_MANAGER;

use crate::argo::Workflow;
use crate::error::WorkflowError;
use crate::labels::{WorkflowLabels, PROCESSED_LABEL};

/// Workflow storage operations used by the engine and executor
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Unprocessed workflows carrying exactly these labels
    async fn get_by_labels(&self, labels: &WorkflowLabels) -> Result<Vec<Workflow>, WorkflowError>;

    /// Create a workflow, returning the stored object
    async fn create(&self, workflow: &Workflow) -> Result<Workflow, WorkflowError>;

    /// Delete a workflow; already-deleted workflows are not an error
    async fn delete(&self, workflow: &Workflow) -> Result<(), WorkflowError>;

    /// Label a workflow processed so later reads skip it
    async fn mark_processed(&self, workflow: &Workflow) -> Result<(), WorkflowError>;
}

/// Repository backed by the Kubernetes API
pub struct KubeWorkflowRepository {
    client: Client,
    namespace: String,
}

impl KubeWorkflowRepository {
    /// Repository for workflows in `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api_for(&self, workflow: &Workflow) -> Api<Workflow> {
        let namespace = workflow
            .namespace()
            .unwrap_or_else(|| self.namespace.clone());
        Api::namespaced(self.client.clone(), &namespace)
    }
}

#[async_trait]
impl WorkflowRepository for KubeWorkflowRepository {
    async fn get_by_labels(&self, labels: &WorkflowLabels) -> Result<Vec<Workflow>, WorkflowError> {
        let api: Api<Workflow> = Api::namespaced(self.client.clone(), &self.namespace);
        let list = api
            .list(&ListParams::default().labels(&labels.selector()))
            .await?;

        debug!(
            owner = %labels.owner,
            operation = %labels.operation,
            count = list.items.len(),
            "matching workflows"
        );
        Ok(list.items)
    }

    async fn create(&self, workflow: &Workflow) -> Result<Workflow, WorkflowError> {
        let created = self
            .api_for(workflow)
            .create(&PostParams::default(), workflow)
            .await?;
        debug!(workflow = %created.name_any(), "created workflow");
        Ok(created)
    }

    async fn delete(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        let name = workflow.name_any();
        match self
            .api_for(workflow)
            .delete(&name, &DeleteParams::background())
            .await
        {
            Ok(_) => {
                debug!(workflow = %name, "deleted workflow");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_processed(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        let name = workflow.name_any();
        let patch = serde_json::json!({
            "metadata": { "labels": { PROCESSED_LABEL: "true" } }
        });
        match self
            .api_for(workflow)
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!(workflow = %name, "marked workflow processed");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
