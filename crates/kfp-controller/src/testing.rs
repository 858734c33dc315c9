//! Mocks shared by the reconciler tests

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;

use kfp_common::crd::Status;
use kfp_common::events::NoopEventPublisher;
use kfp_common::Resource;
use kfp_engine::{CommandExecutor, EngineError, ResourceClient};
use kfp_workflow::{Workflow, WorkflowError, WorkflowLabels, WorkflowRepository};

mock! {
    pub Resources<R: Resource> {}

    #[async_trait]
    impl<R: Resource> ResourceClient<R> for Resources<R> {
        async fn patch_status(&self, resource: &R, status: &Status) -> Result<(), EngineError>;
        async fn add_finalizer(&self, resource: &R) -> Result<Option<String>, EngineError>;
        async fn remove_finalizer(&self, resource: &R) -> Result<Option<String>, EngineError>;
        async fn delete(&self, resource: &R) -> Result<(), EngineError>;
    }
}

mock! {
    pub Repository {}

    #[async_trait]
    impl WorkflowRepository for Repository {
        async fn get_by_labels(&self, labels: &WorkflowLabels) -> Result<Vec<Workflow>, WorkflowError>;
        async fn create(&self, workflow: &Workflow) -> Result<Workflow, WorkflowError>;
        async fn delete(&self, workflow: &Workflow) -> Result<(), WorkflowError>;
        async fn mark_processed(&self, workflow: &Workflow) -> Result<(), WorkflowError>;
    }
}

/// Executor over mocked resource writes and workflows
pub fn executor<R: Resource>(
    resources: MockResources<R>,
    repository: MockRepository,
) -> CommandExecutor<R> {
    CommandExecutor::new(
        Arc::new(resources),
        Arc::new(repository),
        Arc::new(NoopEventPublisher),
    )
}
