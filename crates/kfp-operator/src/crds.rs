//! CRD installation
//!
//! The operator installs its own CRDs on startup using server-side apply so
//! the served schema always matches the operator version.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt, ResourceExt};

use kfp_common::crd::{Experiment, Pipeline, Provider, Run, RunConfiguration, RunSchedule};
use kfp_common::FIELD_MANAGER;

/// Every CRD the operator serves
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        Pipeline::crd(),
        Experiment::crd(),
        Run::crd(),
        RunConfiguration::crd(),
        RunSchedule::crd(),
        Provider::crd(),
    ]
}

/// All CRDs as one YAML stream
pub fn crds_yaml() -> Result<String, serde_yaml::Error> {
    let documents = all_crds()
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(documents.join("---\n"))
}

/// Install or update every CRD
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in all_crds() {
        let name = crd.name_any();
        tracing::info!(crd = %name, "installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("all CRDs installed/updated");
    Ok(())
}
