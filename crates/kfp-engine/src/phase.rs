//! Latest workflow per phase bucket

use kfp_workflow::{Workflow, WorkflowPhase};

/// Most recent workflow in each bucket of one operation
#[derive(Debug, Default)]
pub struct LatestByPhase<'a> {
    /// Not finished yet, including workflows without a phase
    pub in_progress: Option<&'a Workflow>,
    /// Finished successfully
    pub succeeded: Option<&'a Workflow>,
    /// Failed or errored
    pub failed: Option<&'a Workflow>,
}

/// Bucket `workflows` by phase and keep the newest of each
///
/// Among workflows created at the same time the one listed last wins.
pub fn latest_workflow_by_phase(workflows: &[Workflow]) -> LatestByPhase<'_> {
    let mut latest = LatestByPhase::default();

    for workflow in workflows {
        let bucket = match workflow.phase() {
            Some(WorkflowPhase::Succeeded) => &mut latest.succeeded,
            Some(WorkflowPhase::Failed | WorkflowPhase::Error) => &mut latest.failed,
            _ => &mut latest.in_progress,
        };
        *bucket = Some(newer(*bucket, workflow));
    }

    latest
}

fn newer<'a>(current: Option<&'a Workflow>, candidate: &'a Workflow) -> &'a Workflow {
    let created = |w: &Workflow| w.metadata.creation_timestamp.as_ref().map(|t| t.0);
    match current {
        Some(current) if created(candidate) < created(current) => current,
        _ => candidate,
    }
}
