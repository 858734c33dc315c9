//! Kubernetes Events for synchronization progress
//!
//! Every status write is mirrored as an Event on the resource so that
//! `kubectl describe` shows the synchronization history. Publishing is
//! fire-and-forget: a failed event is logged and never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

use crate::crd::SynchronizationState;

/// Publishes Kubernetes Events about a resource
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on the referenced object
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons shown under REASON in `kubectl get events`
pub mod reasons {
    /// Resource reached Succeeded or Deleted
    pub const SYNCED: &str = "Synced";
    /// Resource reached Failed
    pub const SYNC_FAILED: &str = "SyncFailed";
    /// An operation is in flight
    pub const SYNCING: &str = "Syncing";
}

/// Event actions shown under ACTION in `kubectl get events`
pub mod actions {
    /// Status written by the reconcile loop
    pub const SYNCHRONIZE: &str = "Synchronize";
}

/// A synchronization event derived from a status write
#[derive(Clone, Debug, PartialEq)]
pub struct SyncEvent {
    /// Normal or Warning
    pub type_: EventType,
    /// One of [`reasons`]
    pub reason: &'static str,
    /// Human readable note
    pub note: String,
}

impl SyncEvent {
    /// Describe a status transition to `state` at `version`
    pub fn for_state(state: SynchronizationState, version: &str, message: &str) -> Self {
        let (type_, reason) = match state {
            SynchronizationState::Failed => (EventType::Warning, reasons::SYNC_FAILED),
            SynchronizationState::Succeeded | SynchronizationState::Deleted => {
                (EventType::Normal, reasons::SYNCED)
            }
            _ => (EventType::Normal, reasons::SYNCING),
        };

        let mut note = format!("{} [version: \"{}\"]", state, version);
        if !message.is_empty() {
            note.push_str(": ");
            note.push_str(message);
        }

        Self {
            type_,
            reason,
            note,
        }
    }
}
