//! Command execution against the cluster

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use kfp_common::config::DebugOptions;
use kfp_common::crd::Status;
use kfp_common::events::{actions, EventPublisher, SyncEvent};
use kfp_common::metrics::{record_state_transition, record_workflow_created};
use kfp_common::retry::{retry_with_backoff_if, RetryConfig};
use kfp_common::{Resource, FIELD_MANAGER, FINALIZER_NAME};
use kfp_workflow::labels::OPERATION_LABEL;
use kfp_workflow::{Workflow, WorkflowRepository};

use crate::command::{Command, SetStatus};
use crate::error::EngineError;

/// Writes to the managed resource itself
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient<R: Resource>: Send + Sync {
    /// Merge `status` into the status subresource
    ///
    /// Fails with a conflict when `resource` is stale. A resource that is
    /// already gone is not an error.
    async fn patch_status(&self, resource: &R, status: &Status) -> Result<(), EngineError>;

    /// Add the operator finalizer, returning the new resourceVersion if written
    async fn add_finalizer(&self, resource: &R) -> Result<Option<String>, EngineError>;

    /// Remove the operator finalizer, returning the new resourceVersion if written
    async fn remove_finalizer(&self, resource: &R) -> Result<Option<String>, EngineError>;

    /// Delete the resource
    async fn delete(&self, resource: &R) -> Result<(), EngineError>;
}

/// [`ResourceClient`] backed by the Kubernetes API
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<R: Resource>(&self, resource: &R) -> Api<R> {
        Api::namespaced(self.client.clone(), &resource.namespace().unwrap_or_default())
    }
}

/// Apply `edit` to the live finalizer list and write it back if it changed
///
/// The resourceVersion is sent along so a concurrent writer causes a
/// conflict instead of a lost update.
async fn update_finalizers<R: Resource>(
    api: &Api<R>,
    name: &str,
    edit: &(dyn Fn(&mut Vec<String>) -> bool + Send + Sync),
) -> Result<Option<String>, EngineError> {
    let Some(live) = api.get_opt(name).await? else {
        debug!(resource = %name, "resource gone, skipping finalizer update");
        return Ok(None);
    };

    let mut finalizers = live.finalizers().to_vec();
    if !edit(&mut finalizers) {
        return Ok(None);
    }

    let patch = serde_json::json!({
        "metadata": {
            "resourceVersion": live.resource_version(),
            "finalizers": finalizers
        }
    });

    match api
        .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
    {
        Ok(patched) => Ok(patched.resource_version()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl<R: Resource> ResourceClient<R> for KubeResourceClient {
    async fn patch_status(&self, resource: &R, status: &Status) -> Result<(), EngineError> {
        let name = resource.name_any();
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": resource.resource_version() },
            "status": status
        });

        match self
            .api(resource)
            .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(resource = %name, "resource gone, skipping status update");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn add_finalizer(&self, resource: &R) -> Result<Option<String>, EngineError> {
        let api = self.api(resource);
        let name = resource.name_any();
        let add = |finalizers: &mut Vec<String>| {
            if finalizers.iter().any(|f| f == FINALIZER_NAME) {
                return false;
            }
            finalizers.push(FINALIZER_NAME.to_string());
            true
        };

        retry_with_backoff_if(
            &RetryConfig::conflicts(),
            "add finalizer",
            || update_finalizers(&api, &name, &add),
            EngineError::is_conflict,
        )
        .await
    }

    async fn remove_finalizer(&self, resource: &R) -> Result<Option<String>, EngineError> {
        let api = self.api(resource);
        let name = resource.name_any();
        let remove = |finalizers: &mut Vec<String>| {
            let before = finalizers.len();
            finalizers.retain(|f| f != FINALIZER_NAME);
            finalizers.len() != before
        };

        retry_with_backoff_if(
            &RetryConfig::conflicts(),
            "remove finalizer",
            || update_finalizers(&api, &name, &remove),
            EngineError::is_conflict,
        )
        .await
    }

    async fn delete(&self, resource: &R) -> Result<(), EngineError> {
        let name = resource.name_any();
        match self
            .api(resource)
            .delete(&name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn has_finalizer<R: Resource>(resource: &R) -> bool {
    resource.finalizers().iter().any(|f| f == FINALIZER_NAME)
}

/// Executes handler commands in order, stopping at the first failure
///
/// Nothing is rolled back. The next reconcile pass recomputes commands from
/// whatever the cluster then holds.
pub struct CommandExecutor<R> {
    client: Arc<dyn ResourceClient<R>>,
    repository: Arc<dyn WorkflowRepository>,
    events: Arc<dyn EventPublisher>,
}

impl<R: Resource> CommandExecutor<R> {
    /// Create an executor
    pub fn new(
        client: Arc<dyn ResourceClient<R>>,
        repository: Arc<dyn WorkflowRepository>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            client,
            repository,
            events,
        }
    }

    /// Execute `commands` against `resource`
    ///
    /// Finalizer writes advance the resourceVersion used by later status
    /// writes in the same pass.
    pub async fn execute(&self, resource: &R, commands: Vec<Command>) -> Result<(), EngineError> {
        let mut current = resource.clone();
        for command in commands {
            debug!(
                resource = %current.namespaced_name(),
                command = command.name(),
                "executing command"
            );
            self.execute_one(&mut current, command).await?;
        }
        Ok(())
    }

    async fn execute_one(&self, resource: &mut R, command: Command) -> Result<(), EngineError> {
        match command {
            Command::SetStatus(set_status) => self.set_status(resource, set_status).await,
            Command::CreateWorkflow(workflow) => self.create_workflow(resource, &workflow).await,
            Command::DeleteWorkflows(workflows) => self.delete_workflows(&workflows).await,
            Command::AcquireResource if !has_finalizer(resource) => {
                debug!(resource = %resource.namespaced_name(), "adding finalizer");
                if let Some(version) = self.client.add_finalizer(resource).await? {
                    resource.meta_mut().resource_version = Some(version);
                }
                Ok(())
            }
            Command::ReleaseResource if has_finalizer(resource) => {
                debug!(resource = %resource.namespaced_name(), "removing finalizer");
                if let Some(version) = self.client.remove_finalizer(resource).await? {
                    resource.meta_mut().resource_version = Some(version);
                }
                Ok(())
            }
            Command::AcquireResource | Command::ReleaseResource => Ok(()),
            Command::DeleteResource => {
                info!(resource = %resource.namespaced_name(), "deleting resource");
                self.client.delete(resource).await
            }
        }
    }

    async fn set_status(&self, resource: &R, set_status: SetStatus) -> Result<(), EngineError> {
        let SetStatus {
            mut status,
            message,
        } = set_status;
        status.merge_synchronized_condition(&message);

        debug!(
            resource = %resource.namespaced_name(),
            old = ?resource.sync_status(),
            new = ?status,
            "setting status"
        );
        self.client.patch_status(resource, &status).await?;

        record_state_transition(R::KIND, status.synchronization_state);
        let event = SyncEvent::for_state(status.synchronization_state, &status.version, &message);
        self.events
            .publish(
                &resource.object_ref(&()),
                event.type_,
                event.reason,
                actions::SYNCHRONIZE,
                Some(event.note),
            )
            .await;
        Ok(())
    }

    async fn create_workflow(&self, resource: &R, workflow: &Workflow) -> Result<(), EngineError> {
        let created = self.repository.create(workflow).await?;
        let operation = workflow
            .labels()
            .get(OPERATION_LABEL)
            .map(String::as_str)
            .unwrap_or("unknown");
        info!(
            resource = %resource.namespaced_name(),
            workflow = %created.name_any(),
            operation,
            "created workflow"
        );
        record_workflow_created(R::KIND, operation);
        Ok(())
    }

    async fn delete_workflows(&self, workflows: &[Workflow]) -> Result<(), EngineError> {
        for workflow in workflows {
            if DebugOptions::from_annotations(workflow.annotations()).keep_workflows {
                self.repository.mark_processed(workflow).await?;
            } else {
                self.repository.delete(workflow).await?;
            }
        }
        Ok(())
    }
}
