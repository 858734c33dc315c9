//! Observed generation bookkeeping

use kfp_common::Resource;
use tracing::warn;

use crate::command::{Command, SetStatus};

/// Record the resource's generation on the status this pass writes
///
/// Every SetStatus gets the current generation. When nothing else would
/// write status, a SetStatus carrying the unchanged status is appended.
/// Commands are returned untouched if the generation was already observed.
pub fn always_set_observed_generation<R: Resource>(
    commands: Vec<Command>,
    resource: &R,
) -> Vec<Command> {
    let generation = resource.generation();
    let status = resource.sync_status();
    if generation == status.observed_generation {
        return commands;
    }

    let mut set_status_exists = false;
    let mut modified: Vec<Command> = commands
        .into_iter()
        .map(|command| match command {
            Command::SetStatus(mut set_status) => {
                if set_status_exists {
                    warn!(
                        resource = %resource.namespaced_name(),
                        "attempting to set status more than once in the same reconciliation"
                    );
                }
                set_status_exists = true;
                set_status.status.observed_generation = generation;
                Command::SetStatus(set_status)
            }
            other => other,
        })
        .collect();

    if !set_status_exists {
        let mut status = status;
        status.observed_generation = generation;
        modified.push(SetStatus::from_status(status).into());
    }

    modified
}
