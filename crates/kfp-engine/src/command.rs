//! Commands produced by the state handler
//!
//! Commands are plain values. The handler decides, the executor acts, so
//! every transition can be asserted on without a cluster.

use kfp_common::crd::{NamespacedName, Status, SynchronizationState};
use kfp_workflow::Workflow;

/// Status to write, and the message explaining it
#[derive(Clone, Debug, PartialEq)]
pub struct SetStatus {
    /// Full synchronization status
    pub status: Status,
    /// Message for the Synchronized condition and the event
    pub message: String,
}

impl SetStatus {
    /// Start from an existing status
    pub fn from_status(status: Status) -> Self {
        Self {
            status,
            message: String::new(),
        }
    }

    /// Set the synchronization state
    pub fn with_state(mut self, state: SynchronizationState) -> Self {
        self.status.synchronization_state = state;
        self
    }

    /// Set the version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.status.version = version.into();
        self
    }

    /// Set the provider-side id
    pub fn with_provider_id(mut self, id: impl Into<String>) -> Self {
        self.status.provider.id = id.into();
        self
    }

    /// Set the provider the operation targets
    pub fn with_provider(mut self, provider: NamespacedName) -> Self {
        self.status.provider.name = provider;
        self
    }

    /// Set the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// A single effect on the cluster
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Write the status subresource
    SetStatus(SetStatus),
    /// Submit a workflow
    CreateWorkflow(Box<Workflow>),
    /// Delete consumed workflows, or mark them processed when kept for debugging
    DeleteWorkflows(Vec<Workflow>),
    /// Add the finalizer if missing
    AcquireResource,
    /// Remove the finalizer if present
    ReleaseResource,
    /// Delete the resource itself
    DeleteResource,
}

impl From<SetStatus> for Command {
    fn from(set_status: SetStatus) -> Self {
        Command::SetStatus(set_status)
    }
}

impl Command {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetStatus(_) => "SetStatus",
            Self::CreateWorkflow(_) => "CreateWorkflow",
            Self::DeleteWorkflows(_) => "DeleteWorkflows",
            Self::AcquireResource => "AcquireResource",
            Self::ReleaseResource => "ReleaseResource",
            Self::DeleteResource => "DeleteResource",
        }
    }
}

/// Commands of one transition, tagged with the finalizer they require
///
/// The finalizer is held while the provider may still hold anything the
/// resource created, so only a terminal transition releases it.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// Provider side effects may be pending; the finalizer is held
    NonTerminal(Vec<Command>),
    /// Nothing remains on the provider; the finalizer is released
    Terminal(Vec<Command>),
}

impl Transition {
    /// Commands with the finalizer command first
    pub fn into_commands(self) -> Vec<Command> {
        let (lock, commands) = match self {
            Self::NonTerminal(commands) => (Command::AcquireResource, commands),
            Self::Terminal(commands) => (Command::ReleaseResource, commands),
        };
        std::iter::once(lock).chain(commands).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_untouched_fields() {
        let mut status = Status::default();
        status.provider.id = "kfp-123".to_string();
        status.observed_generation = 4;

        let set_status = SetStatus::from_status(status)
            .with_state(SynchronizationState::Updating)
            .with_version("v2")
            .with_message("updating");

        assert_eq!(set_status.status.provider.id, "kfp-123");
        assert_eq!(set_status.status.observed_generation, 4);
        assert_eq!(set_status.status.version, "v2");
        assert_eq!(
            set_status.status.synchronization_state,
            SynchronizationState::Updating
        );
        assert_eq!(set_status.message, "updating");
    }

    #[test]
    fn non_terminal_transitions_hold_the_finalizer() {
        let commands = Transition::NonTerminal(vec![Command::DeleteResource]).into_commands();
        assert_eq!(
            commands,
            vec![Command::AcquireResource, Command::DeleteResource]
        );
    }

    #[test]
    fn terminal_transitions_release_the_finalizer() {
        let commands = Transition::Terminal(vec![]).into_commands();
        assert_eq!(commands, vec![Command::ReleaseResource]);
    }
}
