//! Integrated Executor — the interlock.
//!
//! Every call flows through a fixed five-stage pipeline: effort evaluate,
//! policy evaluate, CRV pre-check, tool execute, CRV post-check.

use crate::crv::{CrvGate, CrvReport};
use crate::effort::{EffortEvaluator, EffortReport, ObservedMetrics, Recommendation};
use crate::error::{KernelError, PolicyError};
use crate::policy::{PolicyDecision, PolicyGate};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::tool::{ToolExecutionContext, ToolResult, ToolWrapper};
use crate::types::{Action, Commit, CorrelationIds, Principal};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

pub struct IntegratedRequest<'a> {
    pub principal: &'a Principal,
    pub action: &'a Action,
    pub tool_id: &'a str,
    pub params: Value,
    pub ids: CorrelationIds,
    pub world_model_value_score: f64,
    pub observed_metrics: ObservedMetrics,
}

#[derive(Debug, Clone)]
pub struct IntegratedResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub effort_report: Option<EffortReport>,
    pub crv_pre: Option<CrvReport>,
    pub crv_post: Option<CrvReport>,
    pub requires_human_approval: bool,
    pub approval_token: Option<String>,
}

impl IntegratedResult {
    fn denied(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            effort_report: None,
            crv_pre: None,
            crv_post: None,
            requires_human_approval: false,
            approval_token: None,
        }
    }
}

pub struct IntegratedExecutor {
    pub effort: Option<EffortEvaluator>,
    pub policy: Arc<PolicyGate>,
    pub crv: Arc<CrvGate>,
    pub tool: Arc<ToolWrapper>,
    pub telemetry: Arc<dyn TelemetryCollector>,
}

impl IntegratedExecutor {
    pub async fn execute<F, Fut>(
        &self,
        request: IntegratedRequest<'_>,
        tool_ctx: &ToolExecutionContext,
        invoke: F,
    ) -> Result<IntegratedResult, KernelError>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Value, String>>,
    {
        let start = Instant::now();
        self.telemetry.record_event(TelemetryEvent::StepStart { ids: request.ids });

        // 1. Effort evaluate.
        let effort_report = self.effort.as_ref().map(|evaluator| {
            evaluator.evaluate(request.action.risk_tier, request.observed_metrics, request.world_model_value_score)
        });
        if let Some(report) = &effort_report {
            if report.recommendation == Recommendation::Reject {
                let mut result = IntegratedResult::denied("effort evaluator recommended reject");
                result.effort_report = Some(report.clone());
                self.emit_step_end(request.ids, false, start, Some("effort_rejected"));
                return Ok(result);
            }
        }

        // 2. Policy evaluate.
        let decision = self
            .policy
            .evaluate(request.principal, request.action, Some(request.tool_id), Some(request.ids));
        let decision = match decision {
            Ok(d) => d,
            Err(e) => {
                self.emit_step_end(request.ids, false, start, Some(&e.to_string()));
                return Err(KernelError::Policy(e));
            }
        };
        if !decision.allowed {
            let result = self.pending_human_result(request.action.id, decision, effort_report);
            self.emit_step_end(request.ids, false, start, Some("requires_human_approval"));
            return Ok(result);
        }

        // 3. CRV pre.
        let pre_commit = Commit::new(request.params.clone());
        let crv_pre = self.crv.validate(&pre_commit);
        if crv_pre.blocked_commit {
            let mut result = IntegratedResult::denied("blocked by pre-execution CRV");
            result.effort_report = effort_report;
            result.crv_pre = Some(crv_pre);
            self.emit_step_end(request.ids, false, start, Some("crv_pre_blocked"));
            return Ok(result);
        }

        // 4. Tool execute.
        let tool_result: ToolResult = self.tool.execute(request.tool_id, request.params.clone(), tool_ctx, invoke).await;
        if !tool_result.success {
            let result = IntegratedResult {
                success: false,
                data: None,
                error: tool_result.error,
                effort_report,
                crv_pre: Some(crv_pre),
                crv_post: None,
                requires_human_approval: false,
                approval_token: None,
            };
            self.emit_step_end(request.ids, false, start, Some("tool_execution_failed"));
            return Ok(result);
        }

        // 5. CRV post.
        let output = tool_result.data.clone().unwrap_or(Value::Null);
        let post_commit = Commit::new(output.clone()).with_previous(request.params.clone());
        let crv_post = self.crv.validate(&post_commit);
        if crv_post.blocked_commit {
            let result = IntegratedResult {
                success: false,
                data: Some(output),
                error: Some("blocked by post-execution CRV".to_string()),
                effort_report,
                crv_pre: Some(crv_pre),
                crv_post: Some(crv_post),
                requires_human_approval: false,
                approval_token: None,
            };
            self.emit_step_end(request.ids, false, start, Some("crv_post_blocked"));
            return Ok(result);
        }

        // 6. Attach metadata and return.
        let result = IntegratedResult {
            success: true,
            data: Some(output),
            error: None,
            effort_report,
            crv_pre: Some(crv_pre),
            crv_post: Some(crv_post),
            requires_human_approval: false,
            approval_token: None,
        };
        self.emit_step_end(request.ids, true, start, None);
        Ok(result)
    }

    fn pending_human_result(
        &self,
        action_id: crate::types::ActionId,
        decision: PolicyDecision,
        effort_report: Option<EffortReport>,
    ) -> IntegratedResult {
        let error = decision.reason.clone().or_else(|| {
            decision
                .requires_human_approval
                .then(|| PolicyError::RequiresHumanApproval { action_id }.to_string())
        });
        IntegratedResult {
            success: false,
            data: None,
            error,
            effort_report,
            crv_pre: None,
            crv_post: None,
            requires_human_approval: decision.requires_human_approval,
            approval_token: decision.approval_token,
        }
    }

    fn emit_step_end(&self, ids: CorrelationIds, success: bool, start: Instant, error: Option<&str>) {
        self.telemetry.record_event(TelemetryEvent::StepEnd {
            ids,
            success,
            duration_ms: start.elapsed().as_millis() as u64,
            error: error.map(str::to_string),
        });
    }
}
