//! The `TelemetryCollector` contract and the closed set of event types the
//! core emits. Exporters/wire formats are out of scope — this module only
//! defines what the core hands to a sink.

use crate::types::CorrelationIds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TelemetryEvent {
    StepStart {
        ids: CorrelationIds,
    },
    StepEnd {
        ids: CorrelationIds,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    ToolCall {
        ids: CorrelationIds,
        tool_id: String,
        sanitized_params: serde_json::Value,
    },
    CrvResult {
        ids: CorrelationIds,
        passed: bool,
        blocked: bool,
        failure_code: Option<String>,
    },
    PolicyCheck {
        ids: CorrelationIds,
        allowed: bool,
        requires_human_approval: bool,
        reason: Option<String>,
    },
    SnapshotCommit {
        ids: CorrelationIds,
    },
    Rollback {
        ids: CorrelationIds,
        reason: String,
    },
    Custom {
        ids: CorrelationIds,
        name: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub ids: CorrelationIds,
    pub duration_ms: u64,
}

/// Synchronous emission; never blocks the caller for long; implementations
/// may buffer.
pub trait TelemetryCollector: Send + Sync {
    fn record_event(&self, event: TelemetryEvent);
    fn record_metric(&self, name: &str, value: f64, tags: &BTreeMap<String, String>);
    fn record_span(&self, span: Span);
}

/// Reference in-memory collector: buffers events for inspection in tests and
/// also forwards to `tracing` so a human tailing logs sees the same trail.
#[derive(Default)]
pub struct InMemoryTelemetry {
    events: parking_lot::Mutex<Vec<TelemetryEvent>>,
    metrics: parking_lot::Mutex<Vec<(String, f64)>>,
    spans: parking_lot::Mutex<Vec<Span>>,
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn events_of<F: Fn(&TelemetryEvent) -> bool>(&self, pred: F) -> Vec<TelemetryEvent> {
        self.events.lock().iter().filter(|e| pred(e)).cloned().collect()
    }
}

impl TelemetryCollector for InMemoryTelemetry {
    fn record_event(&self, event: TelemetryEvent) {
        tracing::debug!(?event, "telemetry event");
        self.events.lock().push(event);
    }

    fn record_metric(&self, name: &str, value: f64, tags: &BTreeMap<String, String>) {
        tracing::trace!(name, value, ?tags, "telemetry metric");
        self.metrics.lock().push((name.to_string(), value));
    }

    fn record_span(&self, span: Span) {
        tracing::trace!(?span, "telemetry span");
        self.spans.lock().push(span);
    }
}
