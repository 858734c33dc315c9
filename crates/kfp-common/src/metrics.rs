//! OpenTelemetry instruments for reconciliation
//!
//! Exported through the global meter provider installed by
//! [`crate::telemetry::init_telemetry`]; without an OTLP endpoint the
//! instruments are no-ops.

use std::time::Instant;

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::crd::SynchronizationState;
use crate::ResourceKind;

static METER: Lazy<Meter> = Lazy::new(|| global::meter("kfp-operator"));

/// Reconcile duration in seconds
///
/// Labels:
/// - `kind`: resource kind
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("kfp_reconcile_duration_seconds")
        .with_description("Duration of resource reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Synchronization state changes written to status
///
/// Labels:
/// - `kind`: resource kind
/// - `state`: new synchronization state
pub static STATE_TRANSITIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("kfp_state_transitions_total")
        .with_description("Total number of synchronization state writes")
        .with_unit("{transitions}")
        .build()
});

/// Workflows created for provider operations
///
/// Labels:
/// - `kind`: resource kind
/// - `operation`: create, update, delete
pub static WORKFLOWS_CREATED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("kfp_workflows_created_total")
        .with_description("Total number of provider workflows created")
        .with_unit("{workflows}")
        .build()
});

/// Record a status write
pub fn record_state_transition(kind: ResourceKind, state: SynchronizationState) {
    STATE_TRANSITIONS.add(
        1,
        &[
            KeyValue::new("kind", kind.as_str()),
            KeyValue::new("state", state.to_string()),
        ],
    );
}

/// Record a workflow creation
pub fn record_workflow_created(kind: ResourceKind, operation: &str) {
    WORKFLOWS_CREATED.add(
        1,
        &[
            KeyValue::new("kind", kind.as_str()),
            KeyValue::new("operation", operation.to_string()),
        ],
    );
}

/// Times one reconcile pass
pub struct ReconcileTimer {
    kind: ResourceKind,
    start: Instant,
}

impl ReconcileTimer {
    /// Start timing
    pub fn start(kind: ResourceKind) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }

    /// Record a successful pass
    pub fn success(self) {
        self.record("success");
    }

    /// Record a failed pass
    pub fn error(self) {
        self.record("error");
    }

    fn record(self, result: &'static str) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[
                KeyValue::new("kind", self.kind.as_str()),
                KeyValue::new("result", result),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_provider_is_noop() {
        record_state_transition(ResourceKind::Pipeline, SynchronizationState::Creating);
        record_workflow_created(ResourceKind::Run, "create");
        ReconcileTimer::start(ResourceKind::Experiment).success();
        ReconcileTimer::start(ResourceKind::Experiment).error();
    }
}
