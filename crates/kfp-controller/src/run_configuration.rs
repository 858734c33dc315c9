//! RunConfiguration controller
//!
//! RunConfigurations never talk to a provider. They record their
//! dependencies, fire owned Runs when a trigger changes, converge one owned
//! RunSchedule per schedule, and report the schedules' aggregate state.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Resource as _, ResourceExt};
use tracing::{debug, info, instrument};

use kfp_common::crd::{
    NamespacedName, OnChangeType, PipelineIdentifier, Run, RunConfiguration, RunSchedule,
    RunScheduleSpec, RunSpec, SynchronizationState, TriggeredRunReference, TriggersStatus,
};
use kfp_common::metrics::ReconcileTimer;
use kfp_common::{Resource, FINALIZER_NAME, PROVIDER_ANNOTATION};
use kfp_engine::{provider_changed_guard, Command, SetStatus};

use crate::dependencies::desired_dependencies;
use crate::error::ReconcileError;
use crate::provider::desired_provider;
use crate::reconciler::Context;

/// Reconcile a RunConfiguration
#[instrument(skip(rc, ctx), fields(resource = %rc.namespaced_name()))]
pub async fn reconcile(
    rc: Arc<RunConfiguration>,
    ctx: Arc<Context<RunConfiguration>>,
) -> Result<Action, ReconcileError> {
    let timer = ReconcileTimer::start(RunConfiguration::KIND);
    let result = reconcile_run_configuration(rc.as_ref(), &ctx).await;
    match &result {
        Ok(_) => timer.success(),
        Err(_) => timer.error(),
    }
    result
}

async fn reconcile_run_configuration(
    rc: &RunConfiguration,
    ctx: &Context<RunConfiguration>,
) -> Result<Action, ReconcileError> {
    // owned resources are garbage collected, nothing holds the deletion
    if rc.finalizers().iter().any(|f| f == FINALIZER_NAME) {
        ctx.executor
            .execute(rc, vec![Command::ReleaseResource])
            .await?;
        return Ok(Action::await_change());
    }
    if rc.deletion_requested() {
        return Ok(Action::await_change());
    }

    let desired = desired_provider(rc, &ctx.config)?;
    let status = rc.rc_status();

    if let Some(failed) = provider_changed_guard(&status.base, &desired) {
        if status.base.synchronization_state != SynchronizationState::Failed {
            info!(
                resource = %rc.namespaced_name(),
                current = %status.base.provider.name,
                desired = %desired,
                "provider changed, failing run configuration"
            );
            ctx.executor.execute(rc, vec![failed.into()]).await?;
        }
        return Ok(Action::await_change());
    }

    let dependencies = desired_dependencies(ctx.kfp.as_ref(), rc).await?;
    if dependencies != status.dependencies {
        info!(resource = %rc.namespaced_name(), "dependencies changed");
        let mut status = status;
        status.dependencies = dependencies;
        ctx.kfp.patch_run_configuration_status(rc, &status).await?;
        return Ok(Action::await_change());
    }

    let triggers = desired_triggers(rc);
    if triggers != status.triggers {
        if fires(&status.triggers, &triggers) {
            trigger_run(rc, &desired, ctx).await?;
        }
        let mut status = status;
        status.triggers = triggers;
        ctx.kfp.patch_run_configuration_status(rc, &status).await?;
        return Ok(Action::await_change());
    }

    let Some(state) = sync_run_schedules(rc, &desired, ctx).await? else {
        debug!(resource = %rc.namespaced_name(), "parameters unresolved, waiting");
        return Ok(Action::await_change());
    };

    let mut base = status.base.clone();
    base.provider.name = desired;
    base.synchronization_state = state;
    base.version = rc.compute_version();
    base.observed_generation = rc.generation();
    if base != status.base {
        ctx.executor
            .execute(rc, vec![SetStatus::from_status(base).into()])
            .await?;
    }

    Ok(Action::await_change())
}

/// Trigger bookkeeping as it should be recorded now
fn desired_triggers(rc: &RunConfiguration) -> TriggersStatus {
    let mut triggers = TriggersStatus::default();

    if rc.triggers_on(OnChangeType::Pipeline) {
        triggers.pipeline.version = rc.observed_pipeline_version();
    }
    if rc.triggers_on(OnChangeType::RunSpec) {
        triggers.run_spec.version = rc.spec.run.compute_version();
    }

    let dependencies = rc.rc_status().dependencies.run_configurations;
    triggers.run_configurations = rc
        .spec
        .triggers
        .run_configurations
        .iter()
        .filter_map(|name| {
            let key = name.to_string();
            let provider_id = dependencies.get(&key)?.provider_id.clone();
            (!provider_id.is_empty()).then_some((key, TriggeredRunReference { provider_id }))
        })
        .collect::<BTreeMap<_, _>>();

    triggers
}

/// Whether moving from `recorded` to `desired` fires a Run
///
/// Clearing a trigger only updates the bookkeeping.
fn fires(recorded: &TriggersStatus, desired: &TriggersStatus) -> bool {
    let pipeline = !desired.pipeline.version.is_empty()
        && desired.pipeline.version != recorded.pipeline.version;
    let run_spec = !desired.run_spec.version.is_empty()
        && desired.run_spec.version != recorded.run_spec.version;
    let run_configurations = desired
        .run_configurations
        .iter()
        .any(|(key, reference)| recorded.run_configurations.get(key) != Some(reference));
    pipeline || run_spec || run_configurations
}

fn owned_metadata(rc: &RunConfiguration, provider: &NamespacedName) -> ObjectMeta {
    ObjectMeta {
        generate_name: Some(format!("{}-", rc.name_any())),
        namespace: rc.namespace(),
        owner_references: rc.controller_owner_ref(&()).map(|r| vec![r]),
        annotations: Some(BTreeMap::from([(
            PROVIDER_ANNOTATION.to_string(),
            provider.to_string(),
        )])),
        ..Default::default()
    }
}

fn pinned_pipeline(rc: &RunConfiguration) -> PipelineIdentifier {
    PipelineIdentifier::versioned(&rc.spec.run.pipeline.name, rc.observed_pipeline_version())
}

/// Run a triggered change starts
fn construct_run(rc: &RunConfiguration, provider: &NamespacedName) -> Run {
    Run {
        metadata: owned_metadata(rc, provider),
        spec: RunSpec {
            provider: provider.clone(),
            pipeline: pinned_pipeline(rc),
            experiment_name: rc.spec.run.experiment_name.clone(),
            parameters: rc.spec.run.parameters.clone(),
            artifacts: rc.spec.run.artifacts.clone(),
        },
        status: None,
    }
}

/// Create the triggered Run unless an identical one is still pending
async fn trigger_run(
    rc: &RunConfiguration,
    provider: &NamespacedName,
    ctx: &Context<RunConfiguration>,
) -> Result<(), ReconcileError> {
    let run = construct_run(rc, provider);
    let version = run.spec.compute_version();

    let owned = ctx.kfp.list_owned_runs(rc).await?;
    let pending = owned.iter().any(|existing| {
        existing.run_status().completion_state.is_none()
            && existing.spec.compute_version() == version
    });
    if pending {
        debug!(resource = %rc.namespaced_name(), "triggered run already pending");
        return Ok(());
    }

    info!(resource = %rc.namespaced_name(), "trigger fired, creating run");
    ctx.kfp.create_run(&run).await
}

/// One RunSchedule per schedule trigger, `None` while parameters are unresolved
fn construct_run_schedules(
    rc: &RunConfiguration,
    provider: &NamespacedName,
) -> Option<Vec<RunSchedule>> {
    let dependencies = rc.rc_status().dependencies;
    let (parameters, _) = rc.spec.run.resolve_parameters(&dependencies).ok()?;

    Some(
        rc.spec
            .triggers
            .schedules
            .iter()
            .map(|schedule| RunSchedule {
                metadata: owned_metadata(rc, provider),
                spec: RunScheduleSpec {
                    provider: provider.clone(),
                    pipeline: pinned_pipeline(rc),
                    experiment_name: rc.spec.run.experiment_name.clone(),
                    parameters: parameters.clone(),
                    artifacts: rc.spec.run.artifacts.clone(),
                    schedule: schedule.clone(),
                },
                status: None,
            })
            .collect(),
    )
}

/// Create missing and delete excess schedules, then aggregate their state
///
/// Returns `Updating` while schedules were changed this pass.
async fn sync_run_schedules(
    rc: &RunConfiguration,
    provider: &NamespacedName,
    ctx: &Context<RunConfiguration>,
) -> Result<Option<SynchronizationState>, ReconcileError> {
    let Some(desired) = construct_run_schedules(rc, provider) else {
        return Ok(None);
    };
    let owned = ctx.kfp.list_owned_run_schedules(rc).await?;

    let owned_versions: Vec<String> = owned.iter().map(Resource::compute_version).collect();
    let desired_versions: Vec<String> = desired.iter().map(Resource::compute_version).collect();

    let missing: Vec<&RunSchedule> = desired
        .iter()
        .zip(&desired_versions)
        .filter(|(_, v)| !owned_versions.contains(v))
        .map(|(s, _)| s)
        .collect();
    let excess: Vec<&RunSchedule> = owned
        .iter()
        .zip(&owned_versions)
        .filter(|(s, v)| !desired_versions.contains(v) && !s.deletion_requested())
        .map(|(s, _)| s)
        .collect();

    if missing.is_empty() && excess.is_empty() {
        return Ok(Some(aggregate_state(&owned)));
    }

    for schedule in missing {
        ctx.kfp.create_run_schedule(schedule).await?;
    }
    for schedule in excess {
        info!(resource = %rc.namespaced_name(), run_schedule = %schedule.name_any(), "deleting excess run schedule");
        ctx.kfp.delete_run_schedule(schedule).await?;
    }
    Ok(Some(SynchronizationState::Updating))
}

/// Failed if any schedule failed, Updating while any is in flight
fn aggregate_state(schedules: &[RunSchedule]) -> SynchronizationState {
    let states: Vec<SynchronizationState> = schedules
        .iter()
        .map(|s| s.sync_status().synchronization_state)
        .collect();

    if states.contains(&SynchronizationState::Failed) {
        SynchronizationState::Failed
    } else if states.iter().any(|s| *s != SynchronizationState::Succeeded) {
        SynchronizationState::Updating
    } else {
        SynchronizationState::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockKfpClient;
    use crate::testing::{executor, MockRepository, MockResources};
    use kfp_common::config::ControllerConfig;
    use kfp_common::crd::{
        Artifact, CompletionState, Parameter, RunConfigurationSpec, RunConfigurationStatus,
        RunReference, Schedule, Status, Triggers,
    };

    const VERTEX: (&str, &str) = ("kfp-operator-system", "vertex");

    fn vertex() -> NamespacedName {
        NamespacedName::new(VERTEX.0, VERTEX.1)
    }

    fn sample_rc() -> RunConfiguration {
        let mut rc = RunConfiguration::new(
            "nightly",
            RunConfigurationSpec {
                run: RunSpec {
                    provider: vertex(),
                    pipeline: PipelineIdentifier::unversioned("fraud"),
                    parameters: vec![Parameter::literal("epochs", "3")],
                    ..Default::default()
                },
                triggers: Triggers::default(),
            },
        );
        rc.metadata.namespace = Some("team-a".to_string());
        rc.metadata.uid = Some("rc-uid".to_string());
        rc.metadata.generation = Some(2);
        rc.rc_status_mut().dependencies.pipeline.version = "v1-abc".to_string();
        rc
    }

    fn with_schedules(mut rc: RunConfiguration, crons: &[&str]) -> RunConfiguration {
        rc.spec.triggers.schedules = crons
            .iter()
            .map(|cron| Schedule {
                cron_expression: cron.to_string(),
                ..Default::default()
            })
            .collect();
        rc
    }

    fn schedule_in(rc: &RunConfiguration, cron: &str, state: SynchronizationState) -> RunSchedule {
        let mut schedules = construct_run_schedules(&with_schedules(rc.clone(), &[cron]), &vertex())
            .unwrap();
        let mut schedule = schedules.remove(0);
        schedule.metadata.name = Some(format!("nightly-{}", cron.len()));
        schedule.status = Some(Status {
            synchronization_state: state,
            ..Default::default()
        });
        schedule
    }

    fn context(kfp: MockKfpClient, resources: MockResources<RunConfiguration>) -> Context<RunConfiguration> {
        Context::from_parts(
            Arc::new(kfp),
            Arc::new(ControllerConfig::default()),
            executor(resources, MockRepository::new()),
        )
    }

    /// Client whose dependency lookups find the pipeline at `v1-abc`
    fn kfp_with_pipeline() -> MockKfpClient {
        let mut kfp = MockKfpClient::new();
        kfp.expect_get_pipeline().returning(|_| {
            let mut pipeline = kfp_common::crd::Pipeline::new("fraud", Default::default());
            pipeline.status = Some(Status {
                synchronization_state: SynchronizationState::Succeeded,
                version: "v1-abc".to_string(),
                ..Default::default()
            });
            Ok(Some(pipeline))
        });
        kfp
    }

    fn settled(mut rc: RunConfiguration, state: SynchronizationState) -> RunConfiguration {
        let version = rc.compute_version();
        let base = &mut rc.rc_status_mut().base;
        base.provider.name = vertex();
        base.synchronization_state = state;
        base.version = version;
        base.observed_generation = 2;
        rc
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn legacy_finalizer_is_released() {
            let mut resources = MockResources::new();
            resources
                .expect_remove_finalizer()
                .times(1)
                .returning(|_| Ok(Some("5".to_string())));

            let mut rc = sample_rc();
            rc.metadata.finalizers = Some(vec![FINALIZER_NAME.to_string()]);

            let ctx = context(MockKfpClient::new(), resources);
            reconcile_run_configuration(&rc, &ctx).await.unwrap();
        }

        #[tokio::test]
        async fn provider_change_fails_once() {
            let mut resources = MockResources::new();
            resources
                .expect_patch_status()
                .withf(|_, status: &Status| status.synchronization_state == SynchronizationState::Failed)
                .times(1)
                .returning(|_, _| Ok(()));

            let mut rc = settled(sample_rc(), SynchronizationState::Succeeded);
            rc.rc_status_mut().base.provider.name = NamespacedName::new(VERTEX.0, "kfp");

            let ctx = context(MockKfpClient::new(), resources);
            reconcile_run_configuration(&rc, &ctx).await.unwrap();

            rc.rc_status_mut().base.synchronization_state = SynchronizationState::Failed;
            let ctx = context(MockKfpClient::new(), MockResources::new());
            reconcile_run_configuration(&rc, &ctx).await.unwrap();
        }

        #[tokio::test]
        async fn changed_dependencies_are_recorded_first() {
            let mut kfp = kfp_with_pipeline();
            kfp.expect_patch_run_configuration_status()
                .withf(|_, status: &RunConfigurationStatus| {
                    status.dependencies.pipeline.version == "v1-abc"
                })
                .times(1)
                .returning(|_, _| Ok(()));

            let mut rc = sample_rc();
            rc.rc_status_mut().dependencies.pipeline.version = String::new();

            let ctx = context(kfp, MockResources::new());
            reconcile_run_configuration(&rc, &ctx).await.unwrap();
        }

        #[tokio::test]
        async fn without_schedules_the_run_configuration_succeeds() {
            let mut kfp = kfp_with_pipeline();
            kfp.expect_list_owned_run_schedules().returning(|_| Ok(vec![]));

            let mut resources = MockResources::new();
            resources
                .expect_patch_status()
                .withf(|rc: &RunConfiguration, status: &Status| {
                    status.synchronization_state == SynchronizationState::Succeeded
                        && status.provider.name == vertex()
                        && status.observed_generation == 2
                        && status.version == rc.compute_version()
                })
                .times(1)
                .returning(|_, _| Ok(()));

            let ctx = context(kfp, resources);
            reconcile_run_configuration(&sample_rc(), &ctx).await.unwrap();
        }

        #[tokio::test]
        async fn unchanged_status_is_not_written() {
            let mut kfp = kfp_with_pipeline();
            kfp.expect_list_owned_run_schedules().returning(|_| Ok(vec![]));

            let rc = settled(sample_rc(), SynchronizationState::Succeeded);
            let ctx = context(kfp, MockResources::new());
            reconcile_run_configuration(&rc, &ctx).await.unwrap();
        }
    }

    mod triggers {
        use super::*;

        fn triggered_on(change: OnChangeType) -> RunConfiguration {
            let mut rc = sample_rc();
            rc.spec.triggers.on_change = vec![change];
            rc
        }

        #[test]
        fn pipeline_trigger_records_the_observed_version() {
            let triggers = desired_triggers(&triggered_on(OnChangeType::Pipeline));
            assert_eq!(triggers.pipeline.version, "v1-abc");
            assert!(triggers.run_spec.version.is_empty());
        }

        #[test]
        fn run_spec_trigger_records_the_spec_version() {
            let rc = triggered_on(OnChangeType::RunSpec);
            let triggers = desired_triggers(&rc);
            assert_eq!(triggers.run_spec.version, rc.spec.run.compute_version());
            assert!(triggers.pipeline.version.is_empty());
        }

        #[test]
        fn only_succeeded_upstream_runs_are_recorded() {
            let mut rc = sample_rc();
            rc.spec.triggers.run_configurations = vec![
                NamespacedName::new("", "upstream"),
                NamespacedName::new("", "never-ran"),
            ];
            let deps = &mut rc.rc_status_mut().dependencies.run_configurations;
            deps.insert(
                "upstream".to_string(),
                RunReference {
                    provider_id: "run-9".to_string(),
                    artifacts: vec![],
                },
            );
            deps.insert("never-ran".to_string(), RunReference::default());

            let triggers = desired_triggers(&rc);
            assert_eq!(
                triggers.run_configurations,
                BTreeMap::from([(
                    "upstream".to_string(),
                    TriggeredRunReference {
                        provider_id: "run-9".to_string()
                    }
                )])
            );
        }

        #[test]
        fn clearing_a_trigger_does_not_fire() {
            let mut recorded = TriggersStatus::default();
            recorded.pipeline.version = "v1-abc".to_string();
            assert!(!fires(&recorded, &TriggersStatus::default()));
        }

        #[test]
        fn new_upstream_run_fires() {
            let mut recorded = TriggersStatus::default();
            recorded.run_configurations.insert(
                "upstream".to_string(),
                TriggeredRunReference {
                    provider_id: "run-1".to_string(),
                },
            );
            let mut desired = recorded.clone();
            desired
                .run_configurations
                .insert("upstream".to_string(), TriggeredRunReference { provider_id: "run-2".to_string() });
            assert!(fires(&recorded, &desired));
        }

        #[tokio::test]
        async fn fired_trigger_creates_an_owned_run() {
            let mut kfp = kfp_with_pipeline();
            kfp.expect_list_owned_runs().returning(|_| Ok(vec![]));
            kfp.expect_create_run()
                .withf(|run: &Run| {
                    run.metadata.generate_name.as_deref() == Some("nightly-")
                        && run.spec.pipeline == PipelineIdentifier::versioned("fraud", "v1-abc")
                        && run.annotations().get(PROVIDER_ANNOTATION).map(String::as_str)
                            == Some("kfp-operator-system/vertex")
                        && run.owner_references()[0].uid == "rc-uid"
                })
                .times(1)
                .returning(|_| Ok(()));
            kfp.expect_patch_run_configuration_status()
                .withf(|_, status: &RunConfigurationStatus| {
                    status.triggers.pipeline.version == "v1-abc"
                })
                .times(1)
                .returning(|_, _| Ok(()));

            let ctx = context(kfp, MockResources::new());
            reconcile_run_configuration(&triggered_on(OnChangeType::Pipeline), &ctx)
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn pending_identical_run_is_not_duplicated() {
            let rc = triggered_on(OnChangeType::Pipeline);
            let existing = construct_run(&rc, &vertex());

            let mut kfp = kfp_with_pipeline();
            kfp.expect_list_owned_runs()
                .returning(move |_| Ok(vec![existing.clone()]));
            kfp.expect_create_run().never();
            kfp.expect_patch_run_configuration_status()
                .times(1)
                .returning(|_, _| Ok(()));

            let ctx = context(kfp, MockResources::new());
            reconcile_run_configuration(&rc, &ctx).await.unwrap();
        }

        #[tokio::test]
        async fn completed_identical_run_does_not_block_a_new_one() {
            let rc = triggered_on(OnChangeType::Pipeline);
            let mut existing = construct_run(&rc, &vertex());
            existing.run_status_mut().completion_state = Some(CompletionState::Succeeded);

            let mut kfp = kfp_with_pipeline();
            kfp.expect_list_owned_runs()
                .returning(move |_| Ok(vec![existing.clone()]));
            kfp.expect_create_run().times(1).returning(|_| Ok(()));
            kfp.expect_patch_run_configuration_status()
                .times(1)
                .returning(|_, _| Ok(()));

            let ctx = context(kfp, MockResources::new());
            reconcile_run_configuration(&rc, &ctx).await.unwrap();
        }
    }

    mod schedules {
        use super::*;

        #[test]
        fn schedules_carry_resolved_parameters() {
            let mut rc = with_schedules(sample_rc(), &["0 0 * * *"]);
            rc.spec.run.parameters.push(Parameter::from_run_configuration(
                "input",
                NamespacedName::new("", "features"),
                "table",
                false,
            ));
            rc.rc_status_mut().dependencies.run_configurations.insert(
                "features".to_string(),
                RunReference {
                    provider_id: "run-1".to_string(),
                    artifacts: vec![Artifact {
                        name: "table".to_string(),
                        location: "gs://b/table".to_string(),
                    }],
                },
            );

            let schedules = construct_run_schedules(&rc, &vertex()).unwrap();
            assert_eq!(schedules.len(), 1);
            let names: Vec<_> = schedules[0]
                .spec
                .parameters
                .iter()
                .map(|p| (p.name.as_str(), p.value.as_str()))
                .collect();
            assert_eq!(names, vec![("epochs", "3"), ("input", "gs://b/table")]);
            assert_eq!(
                schedules[0].spec.pipeline,
                PipelineIdentifier::versioned("fraud", "v1-abc")
            );
        }

        #[test]
        fn unresolved_parameters_wait() {
            let mut rc = with_schedules(sample_rc(), &["0 0 * * *"]);
            rc.spec.run.parameters.push(Parameter::from_run_configuration(
                "input",
                NamespacedName::new("", "features"),
                "table",
                false,
            ));
            assert!(construct_run_schedules(&rc, &vertex()).is_none());
        }

        #[tokio::test]
        async fn missing_schedules_are_created() {
            let rc = with_schedules(sample_rc(), &["0 0 * * *", "0 12 * * *"]);
            let existing = schedule_in(&rc, "0 0 * * *", SynchronizationState::Succeeded);

            let mut kfp = kfp_with_pipeline();
            kfp.expect_list_owned_run_schedules()
                .returning(move |_| Ok(vec![existing.clone()]));
            kfp.expect_create_run_schedule()
                .withf(|s: &RunSchedule| s.spec.schedule.cron_expression == "0 12 * * *")
                .times(1)
                .returning(|_| Ok(()));

            let ctx = context(kfp, MockResources::new());
            let state = sync_run_schedules(&rc, &vertex(), &ctx).await.unwrap();
            assert_eq!(state, Some(SynchronizationState::Updating));
        }

        #[tokio::test]
        async fn excess_schedules_are_deleted_unless_already_deleting() {
            let rc = with_schedules(sample_rc(), &["0 0 * * *"]);
            let kept = schedule_in(&rc, "0 0 * * *", SynchronizationState::Succeeded);
            let excess = schedule_in(&rc, "*/5 * * * *", SynchronizationState::Succeeded);
            let mut deleting = schedule_in(&rc, "0 6 * * *", SynchronizationState::Deleting);
            deleting.metadata.deletion_timestamp = Some(
                k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
            );

            let mut kfp = kfp_with_pipeline();
            kfp.expect_list_owned_run_schedules()
                .returning(move |_| Ok(vec![kept.clone(), excess.clone(), deleting.clone()]));
            kfp.expect_delete_run_schedule()
                .withf(|s: &RunSchedule| s.spec.schedule.cron_expression == "*/5 * * * *")
                .times(1)
                .returning(|_| Ok(()));

            let ctx = context(kfp, MockResources::new());
            let state = sync_run_schedules(&rc, &vertex(), &ctx).await.unwrap();
            assert_eq!(state, Some(SynchronizationState::Updating));
        }

        #[tokio::test]
        async fn converged_schedules_are_aggregated() {
            let rc = with_schedules(sample_rc(), &["0 0 * * *"]);
            let failed = schedule_in(&rc, "0 0 * * *", SynchronizationState::Failed);

            let mut kfp = kfp_with_pipeline();
            kfp.expect_list_owned_run_schedules()
                .returning(move |_| Ok(vec![failed.clone()]));

            let ctx = context(kfp, MockResources::new());
            let state = sync_run_schedules(&rc, &vertex(), &ctx).await.unwrap();
            assert_eq!(state, Some(SynchronizationState::Failed));
        }

        #[test]
        fn aggregation() {
            let rc = sample_rc();
            let succeeded = schedule_in(&rc, "a", SynchronizationState::Succeeded);
            let updating = schedule_in(&rc, "b", SynchronizationState::Updating);
            let failed = schedule_in(&rc, "c", SynchronizationState::Failed);

            assert_eq!(aggregate_state(&[]), SynchronizationState::Succeeded);
            assert_eq!(
                aggregate_state(&[succeeded.clone()]),
                SynchronizationState::Succeeded
            );
            assert_eq!(
                aggregate_state(&[succeeded.clone(), updating.clone()]),
                SynchronizationState::Updating
            );
            assert_eq!(
                aggregate_state(&[updating, failed, succeeded]),
                SynchronizationState::Failed
            );
        }
    }
}
