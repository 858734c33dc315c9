//! Run controller
//!
//! A Run is synchronized like any workflow-backed resource once its
//! pipeline version is known and its parameters resolve. Completed runs are
//! stamped and, with a completion TTL configured, deleted when it expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use tracing::{debug, info, instrument};

use kfp_common::crd::Run;
use kfp_common::metrics::ReconcileTimer;
use kfp_common::Resource;
use kfp_engine::Command;

use crate::dependencies::desired_dependencies;
use crate::error::ReconcileError;
use crate::reconciler::{synchronize, Context, SyncContext};

/// What completion handling decided
#[derive(Debug, PartialEq)]
enum Completion {
    /// Nothing to do; synchronize as usual
    Continue,
    /// Synchronize, then come back when the TTL expires
    ExpiresIn(Duration),
    /// Status or the run itself was written; stop this pass
    Done,
}

/// Reconcile a Run
#[instrument(skip(run, ctx), fields(resource = %run.namespaced_name()))]
pub async fn reconcile(run: Arc<Run>, ctx: Arc<SyncContext<Run>>) -> Result<Action, ReconcileError> {
    let timer = ReconcileTimer::start(Run::KIND);
    let result = reconcile_run(run.as_ref(), &ctx, Utc::now()).await;
    match &result {
        Ok(_) => timer.success(),
        Err(_) => timer.error(),
    }
    result
}

async fn reconcile_run(
    run: &Run,
    ctx: &SyncContext<Run>,
    now: DateTime<Utc>,
) -> Result<Action, ReconcileError> {
    let expiry = match handle_completion(run, &ctx.base, now).await? {
        Completion::Done => return Ok(Action::await_change()),
        Completion::ExpiresIn(remaining) => Some(remaining),
        Completion::Continue => None,
    };

    if dependencies_pending(run) {
        update_dependencies(run, &ctx.base).await?;
        return Ok(Action::await_change());
    }

    let action = synchronize(run, ctx).await?;
    Ok(expiry.map(Action::requeue).unwrap_or(action))
}

/// Stamp a completed run, and delete it once its completion TTL expired
async fn handle_completion(
    run: &Run,
    ctx: &Context<Run>,
    now: DateTime<Utc>,
) -> Result<Completion, ReconcileError> {
    let status = run.run_status();

    if status.completion_state.is_some() && status.marked_completed_at.is_none() {
        debug!(resource = %run.namespaced_name(), "marking run completed");
        let mut status = status;
        status.marked_completed_at = Some(now);
        ctx.kfp.patch_run_status(run, &status).await?;
        return Ok(Completion::Done);
    }

    let (Some(ttl), Some(marked)) = (ctx.config.run_completion_ttl, status.marked_completed_at)
    else {
        return Ok(Completion::Continue);
    };
    if run.deletion_requested() {
        return Ok(Completion::Continue);
    }

    let Some(expiry) = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| marked.checked_add_signed(ttl))
    else {
        return Ok(Completion::Continue);
    };
    match (expiry - now).to_std() {
        Ok(remaining) if !remaining.is_zero() => Ok(Completion::ExpiresIn(remaining)),
        _ => {
            info!(resource = %run.namespaced_name(), "completion ttl expired, deleting run");
            ctx.executor
                .execute(run, vec![Command::DeleteResource])
                .await?;
            Ok(Completion::Done)
        }
    }
}

/// Whether the pipeline version is unknown or parameters cannot be resolved
fn dependencies_pending(run: &Run) -> bool {
    run.observed_pipeline_version().is_empty()
        || run.spec.resolve_parameters(&run.dependencies()).is_err()
}

async fn update_dependencies(run: &Run, ctx: &Context<Run>) -> Result<(), ReconcileError> {
    let dependencies = desired_dependencies(ctx.kfp.as_ref(), run).await?;
    if dependencies == run.dependencies() {
        debug!(resource = %run.namespaced_name(), "waiting for dependencies");
        return Ok(());
    }

    info!(resource = %run.namespaced_name(), "dependencies changed");
    let mut status = run.run_status();
    status.dependencies = dependencies;
    ctx.kfp.patch_run_status(run, &status).await
}
