//! Workflow factory
//!
//! Builds the create, update and delete workflows for a resource. Every
//! workflow references a provider-neutral WorkflowTemplate and passes the
//! resource, its provider id and the provider service address as
//! parameters.

mod definitions;
mod patch;

pub use definitions::{
    ExperimentDefinition, FrameworkDefinition, PipelineDefinition, RunDefinition,
    RunScheduleDefinition, WorkflowResource, COMPILED_SUFFIX, SIMPLE_SUFFIX,
};
pub use patch::{apply_patches, merge_patch};

use std::sync::Arc;

use kfp_common::config::{ControllerConfig, DebugOptions};
use kfp_common::crd::Provider;
use kfp_common::Resource;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::argo::{Arguments, Parameter, Workflow, WorkflowSpec, WorkflowTemplateRef};
use crate::error::WorkflowError;
use crate::labels::{Operation, WorkflowLabels};

/// Lowercase kind of the resource
pub const RESOURCE_KIND_PARAMETER: &str = "resource-kind";

/// JSON resource definition
pub const RESOURCE_DEFINITION_PARAMETER: &str = "resource-definition";

/// Provider-side id of the resource
pub const RESOURCE_ID_PARAMETER: &str = "resource-id";

/// `namespace/name` of the provider
pub const PROVIDER_NAME_PARAMETER: &str = "provider-name";

/// Address of the provider service
pub const PROVIDER_SERVICE_URL_PARAMETER: &str = "provider-service-url";

/// Compiler image of the pipeline's framework
pub const PIPELINE_FRAMEWORK_IMAGE_PARAMETER: &str = "pipeline-framework-image";

/// Builds the workflows that synchronize `R` with a provider
pub trait WorkflowFactory<R>: Send + Sync {
    /// Workflow creating `resource` on `provider`
    fn construct_creation_workflow(
        &self,
        provider: &Provider,
        resource: &R,
    ) -> Result<Workflow, WorkflowError>;

    /// Workflow updating the provider's copy of `resource`
    fn construct_update_workflow(
        &self,
        provider: &Provider,
        resource: &R,
    ) -> Result<Workflow, WorkflowError>;

    /// Workflow deleting `resource` from `provider`
    fn construct_deletion_workflow(
        &self,
        provider: &Provider,
        resource: &R,
    ) -> Result<Workflow, WorkflowError>;
}

/// Factory for every [`WorkflowResource`]
#[derive(Clone, Debug)]
pub struct ResourceWorkflowFactory {
    config: Arc<ControllerConfig>,
}

impl ResourceWorkflowFactory {
    /// Factory using the template prefix, namespace and defaults in `config`
    pub fn new(config: Arc<ControllerConfig>) -> Self {
        Self { config }
    }

    fn template_name(&self, operation: Operation, suffix: &str) -> String {
        let prefix = &self.config.workflow_template_prefix;
        match operation {
            Operation::Delete => format!("{}delete", prefix),
            _ => format!("{}{}-{}", prefix, operation, suffix),
        }
    }

    fn service_url(&self, provider: &Provider) -> String {
        format!(
            "{}.{}:{}",
            provider.service_name(),
            provider.namespace().unwrap_or_default(),
            self.config.default_provider_values.service_port
        )
    }

    fn metadata<R: Resource>(&self, resource: &R, operation: Operation) -> ObjectMeta {
        let debug = DebugOptions::from_annotations(resource.annotations())
            .with_defaults(self.config.debug);

        // owner references cannot cross namespaces, labels link the rest
        let owner_references = (resource.namespace().as_deref()
            == Some(self.config.workflow_namespace.as_str()))
        .then(|| resource.controller_owner_ref(&()))
        .flatten()
        .map(|r| vec![r]);

        ObjectMeta {
            generate_name: Some(format!("{}-{}-", R::KIND, resource.name_any())),
            namespace: Some(self.config.workflow_namespace.clone()),
            labels: Some(WorkflowLabels::for_resource(resource, operation).to_labels()),
            annotations: Some(debug.to_annotations()),
            owner_references,
            ..Default::default()
        }
    }

    fn construct<R: WorkflowResource>(
        &self,
        provider: &Provider,
        resource: &R,
        operation: Operation,
    ) -> Result<Workflow, WorkflowError> {
        let namespace = resource.namespace().unwrap_or_default();
        if !provider.allows_namespace(&namespace) {
            return Err(WorkflowError::NamespaceNotAllowed {
                name: resource.name_any(),
                namespace,
                provider: provider.name_any(),
            });
        }

        let mut parameters = vec![Parameter::new(RESOURCE_KIND_PARAMETER, R::KIND.as_str())];
        if operation != Operation::Delete {
            let definition = resource.definition(&self.config, provider)?;
            parameters.push(Parameter::new(
                RESOURCE_DEFINITION_PARAMETER,
                serde_json::to_string(&definition)?,
            ));
        }
        if operation != Operation::Create {
            parameters.push(Parameter::new(
                RESOURCE_ID_PARAMETER,
                resource.sync_status().provider.id,
            ));
        }
        parameters.push(Parameter::new(
            PROVIDER_NAME_PARAMETER,
            provider.namespaced_name().to_string(),
        ));
        parameters.push(Parameter::new(
            PROVIDER_SERVICE_URL_PARAMETER,
            self.service_url(provider),
        ));
        parameters.extend(resource.additional_parameters(provider)?);

        Ok(Workflow {
            metadata: self.metadata(resource, operation),
            spec: WorkflowSpec {
                arguments: Arguments { parameters },
                workflow_template_ref: Some(WorkflowTemplateRef {
                    name: self.template_name(operation, R::TEMPLATE_SUFFIX),
                }),
            },
            status: None,
        })
    }
}

impl<R: WorkflowResource> WorkflowFactory<R> for ResourceWorkflowFactory {
    fn construct_creation_workflow(
        &self,
        provider: &Provider,
        resource: &R,
    ) -> Result<Workflow, WorkflowError> {
        self.construct(provider, resource, Operation::Create)
    }

    fn construct_update_workflow(
        &self,
        provider: &Provider,
        resource: &R,
    ) -> Result<Workflow, WorkflowError> {
        self.construct(provider, resource, Operation::Update)
    }

    fn construct_deletion_workflow(
        &self,
        provider: &Provider,
        resource: &R,
    ) -> Result<Workflow, WorkflowError> {
        self.construct(provider, resource, Operation::Delete)
    }
}
