//! Synchronization status shared by every pipeline resource
//!
//! Every field is always serialized: status is written with merge patches,
//! so an omitted field would leave a stale value behind (e.g. a provider id
//! cleared by a successful delete).

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ConditionStatus, NamespacedName};

/// Condition type mirroring the synchronization state
pub const CONDITION_SYNCHRONIZED: &str = "Synchronized";

// =============================================================================
// SynchronizationState
// =============================================================================

/// Where a resource is in its synchronization lifecycle
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum SynchronizationState {
    /// Never reconciled
    #[default]
    #[serde(rename = "")]
    Unknown,
    /// A create workflow is in flight
    Creating,
    /// The provider holds the current version
    Succeeded,
    /// An update workflow is in flight
    Updating,
    /// A delete workflow is in flight
    Deleting,
    /// The provider no longer holds the resource
    Deleted,
    /// The last operation failed
    Failed,
}

impl SynchronizationState {
    /// Condition status reported for this state
    pub fn condition_status(self) -> ConditionStatus {
        match self {
            Self::Succeeded | Self::Deleted => ConditionStatus::True,
            Self::Failed => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }

    /// Whether no operation is in flight
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Deleted)
    }
}

impl fmt::Display for SynchronizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, ""),
            Self::Creating => write!(f, "Creating"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Updating => write!(f, "Updating"),
            Self::Deleting => write!(f, "Deleting"),
            Self::Deleted => write!(f, "Deleted"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Provider a resource was synchronized with, and its handle there
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ProviderAndId {
    /// Provider the current or last operation targeted
    #[serde(default)]
    pub name: NamespacedName,
    /// Opaque identifier assigned by the provider
    #[serde(default)]
    pub id: String,
}

/// Synchronization status common to all workflow-backed resources
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Provider identity and handle
    #[serde(default)]
    pub provider: ProviderAndId,

    /// Lifecycle state
    #[serde(default)]
    pub synchronization_state: SynchronizationState,

    /// Spec hash the current or most recent operation targets
    #[serde(default)]
    pub version: String,

    /// Generation seen by the last reconciliation
    #[serde(default)]
    pub observed_generation: i64,

    /// Standard conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Status {
    /// The Synchronized condition, if present
    pub fn synchronized_condition(&self) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.type_ == CONDITION_SYNCHRONIZED)
    }

    /// Merge a Synchronized condition reflecting the current state
    ///
    /// The existing condition is replaced only when its reason, status or
    /// observed generation differ, which keeps `lastTransitionTime` stable
    /// across no-op reconciliations.
    pub fn merge_synchronized_condition(&mut self, message: &str) {
        let state = self.synchronization_state;
        let condition = Condition::new(
            CONDITION_SYNCHRONIZED,
            state.condition_status(),
            state.to_string(),
            message,
        )
        .with_observed_generation(self.observed_generation);
        merge_condition(&mut self.conditions, condition);
    }
}

/// Insert or replace a condition by type
///
/// Replacement only happens when reason, status or observed generation
/// changed.
pub fn merge_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.reason != condition.reason
                || existing.status != condition.status
                || existing.observed_generation != condition.observed_generation
            {
                *existing = condition;
            }
        }
        None => conditions.push(condition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_state_serializes_as_empty_string() {
        let json = serde_json::to_string(&SynchronizationState::Unknown).unwrap();
        assert_eq!(json, "\"\"");
        let parsed: SynchronizationState = serde_json::from_str("\"Deleting\"").unwrap();
        assert_eq!(parsed, SynchronizationState::Deleting);
    }

    #[test]
    fn empty_status_deserializes_to_defaults() {
        let status: Status = serde_json::from_str("{}").unwrap();
        assert_eq!(status.synchronization_state, SynchronizationState::Unknown);
        assert!(status.provider.id.is_empty());
        assert_eq!(status.observed_generation, 0);
    }

    #[test]
    fn cleared_provider_id_is_still_serialized() {
        let status = Status::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["provider"]["id"], "");
        assert_eq!(json["version"], "");
    }

    #[test]
    fn condition_status_follows_state() {
        assert_eq!(
            SynchronizationState::Succeeded.condition_status(),
            ConditionStatus::True
        );
        assert_eq!(
            SynchronizationState::Deleted.condition_status(),
            ConditionStatus::True
        );
        assert_eq!(
            SynchronizationState::Failed.condition_status(),
            ConditionStatus::False
        );
        assert_eq!(
            SynchronizationState::Updating.condition_status(),
            ConditionStatus::Unknown
        );
    }

    mod condition_merge {
        use super::*;

        fn status_in(state: SynchronizationState, generation: i64) -> Status {
            Status {
                synchronization_state: state,
                observed_generation: generation,
                ..Default::default()
            }
        }

        #[test]
        fn adds_condition_when_missing() {
            let mut status = status_in(SynchronizationState::Creating, 1);
            status.merge_synchronized_condition("");
            let condition = status.synchronized_condition().unwrap();
            assert_eq!(condition.reason, "Creating");
            assert_eq!(condition.status, ConditionStatus::Unknown);
            assert_eq!(condition.observed_generation, Some(1));
        }

        #[test]
        fn keeps_existing_condition_when_unchanged() {
            let mut status = status_in(SynchronizationState::Succeeded, 2);
            status.merge_synchronized_condition("first");
            let first = status.synchronized_condition().unwrap().clone();

            status.merge_synchronized_condition("second");
            let second = status.synchronized_condition().unwrap();
            assert_eq!(second.message, "first");
            assert_eq!(second.last_transition_time, first.last_transition_time);
        }

        #[test]
        fn replaces_condition_when_state_changes() {
            let mut status = status_in(SynchronizationState::Updating, 2);
            status.merge_synchronized_condition("");
            status.synchronization_state = SynchronizationState::Failed;
            status.merge_synchronized_condition("quota exceeded");

            assert_eq!(status.conditions.len(), 1);
            let condition = status.synchronized_condition().unwrap();
            assert_eq!(condition.reason, "Failed");
            assert_eq!(condition.status, ConditionStatus::False);
            assert_eq!(condition.message, "quota exceeded");
        }

        #[test]
        fn replaces_condition_when_generation_changes() {
            let mut status = status_in(SynchronizationState::Succeeded, 2);
            status.merge_synchronized_condition("");
            status.observed_generation = 3;
            status.merge_synchronized_condition("");
            assert_eq!(
                status.synchronized_condition().unwrap().observed_generation,
                Some(3)
            );
        }
    }
}
