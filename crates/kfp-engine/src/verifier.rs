//! Outcome policies for finished workflows

use kfp_common::crd::SynchronizationState;

/// How a successful workflow's provider id is judged
///
/// Create and update must leave an id behind; delete must clear it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdVerifier {
    /// State when the operation succeeded
    pub success_state: SynchronizationState,
    /// State when it did not
    pub failure_state: SynchronizationState,
    expect_id: bool,
}

impl IdVerifier {
    /// Policy for create and update workflows
    pub const SUCCEED_FOR_NON_EMPTY_ID: Self = Self {
        success_state: SynchronizationState::Succeeded,
        failure_state: SynchronizationState::Failed,
        expect_id: true,
    };

    /// Policy for delete workflows; a failed delete stays Deleting
    pub const DELETED_FOR_EMPTY_ID: Self = Self {
        success_state: SynchronizationState::Deleted,
        failure_state: SynchronizationState::Deleting,
        expect_id: false,
    };

    /// Check the id reported by the provider
    pub fn verify(&self, id: &str) -> Result<(), &'static str> {
        match (self.expect_id, id.is_empty()) {
            (true, true) => Err("id was empty"),
            (false, false) => Err("id should be empty"),
            _ => Ok(()),
        }
    }
}
