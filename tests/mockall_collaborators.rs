//! Exercises the Tool Wrapper against mocked external collaborators
//! instead of the in-memory reference implementations, so routing behavior
//! is verified independent of any particular backend.

use goalguard_kernel::collaborators::ToolRegistry;
use goalguard_kernel::telemetry::{Span, TelemetryCollector, TelemetryEvent};
use goalguard_kernel::tool::{ToolExecutionContext, ToolWrapper};
use goalguard_kernel::types::{CorrelationIds, StepId, TaskId, ToolSpec, WorkflowId};
use mockall::mock;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

mock! {
    Registry {}
    impl ToolRegistry for Registry {
        fn get(&self, tool_id: &str) -> Option<ToolSpec>;
    }
}

mock! {
    Telemetry {}
    impl TelemetryCollector for Telemetry {
        fn record_event(&self, event: TelemetryEvent);
        fn record_metric(&self, name: &str, value: f64, tags: &BTreeMap<String, String>);
        fn record_span(&self, span: Span);
    }
}

fn ids() -> CorrelationIds {
    CorrelationIds {
        workflow_id: WorkflowId::new(),
        task_id: TaskId::new(),
        step_id: StepId::new(),
    }
}

#[tokio::test]
async fn unknown_tool_is_reported_without_consulting_telemetry() {
    let mut registry = MockRegistry::new();
    registry.expect_get().withf(|id: &str| id == "ghost").times(1).return_const(None);

    let mut telemetry = MockTelemetry::new();
    telemetry.expect_record_event().times(0);
    telemetry.expect_record_metric().times(0);
    telemetry.expect_record_span().times(0);

    let tool = ToolWrapper::new(Arc::new(registry));
    let ctx = ToolExecutionContext {
        ids: ids(),
        telemetry: Arc::new(telemetry),
        outbox: None,
        cache: None,
    };

    let result = tool.execute("ghost", json!({}), &ctx, |_| async { Ok(json!({})) }).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("ghost"));
}

#[tokio::test]
async fn known_tool_call_is_recorded_to_telemetry_with_sanitized_params() {
    let mut spec = ToolSpec::new("echo", "Echo");
    spec.required_params = vec![];
    let mut registry = MockRegistry::new();
    registry.expect_get().withf(|id: &str| id == "echo").return_const(Some(spec));

    let mut telemetry = MockTelemetry::new();
    telemetry
        .expect_record_event()
        .withf(|event: &TelemetryEvent| {
            matches!(event, TelemetryEvent::ToolCall { tool_id, .. } if tool_id == "echo")
        })
        .times(1)
        .return_const(());

    let tool = ToolWrapper::new(Arc::new(registry));
    let ctx = ToolExecutionContext {
        ids: ids(),
        telemetry: Arc::new(telemetry),
        outbox: None,
        cache: None,
    };

    let result = tool
        .execute("echo", json!({"password": "hunter2"}), &ctx, |_| async { Ok(json!({"ok": true})) })
        .await;
    assert!(result.success);
}
