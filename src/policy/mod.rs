//! Policy Gate — "Goal-Guard".
//!
//! The sole binding authority over whether an action proceeds. Wraps a
//! per-instance FSM (`fsm`), a pending-approval table (`token`), and an
//! append-only audit trail (`audit`).

pub mod audit;
pub mod fsm;
pub mod token;

use crate::clock::Clock;
use crate::error::PolicyError;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{Action, ActionId, CorrelationIds, DataZone, Principal, RiskTier};
use audit::AuditLog;
use fsm::FsmState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use token::ApprovalToken;

/// Outcome of `evaluate`. `approval_token` is set only when
/// `requires_human_approval` is true.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub requires_human_approval: bool,
    pub approval_token: Option<String>,
    pub monitoring_flag: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    fn allow(monitoring_flag: bool) -> Self {
        Self {
            allowed: true,
            requires_human_approval: false,
            approval_token: None,
            monitoring_flag,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_human_approval: false,
            approval_token: None,
            monitoring_flag: false,
            reason: Some(reason.into()),
        }
    }

    fn pending_human(token: &str) -> Self {
        Self {
            allowed: false,
            requires_human_approval: true,
            approval_token: Some(token.to_string()),
            monitoring_flag: false,
            reason: None,
        }
    }
}

struct Pending {
    token: ApprovalToken,
    state: FsmState,
}

/// Intermediate result of the allow-list/permission/MCP/risk-tier checks,
/// before a token (if any) is actually issued. Kept separate from
/// `PolicyDecision` so exactly one `ApprovalToken` is ever generated per
/// gated evaluation (the decision's token string and the stored pending
/// token must be the same secret).
enum Verdict {
    Allow { monitoring_flag: bool },
    PendingHuman,
}

pub struct PolicyGate {
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetryCollector>,
    state: Mutex<FsmState>,
    pending: Mutex<HashMap<ActionId, Pending>>,
    pub audit: AuditLog,
    approval_ttl_secs: u64,
}

impl PolicyGate {
    pub fn new(clock: Arc<dyn Clock>, telemetry: Arc<dyn TelemetryCollector>) -> Self {
        Self {
            clock,
            telemetry,
            state: Mutex::new(FsmState::Idle),
            pending: Mutex::new(HashMap::new()),
            audit: AuditLog::new(),
            approval_ttl_secs: ApprovalToken::DEFAULT_TTL_SECS,
        }
    }

    pub fn with_approval_ttl_secs(mut self, ttl: u64) -> Self {
        self.approval_ttl_secs = ttl;
        self
    }

    /// Evaluates an action against the allow-list, permission, MCP, and
    /// risk-tier rules in order, transitioning the FSM as it goes.
    pub fn evaluate(
        &self,
        principal: &Principal,
        action: &Action,
        tool_name: Option<&str>,
        ids: Option<CorrelationIds>,
    ) -> Result<PolicyDecision, PolicyError> {
        let mut state = self.state.lock();
        fsm::validate_transition(*state, FsmState::Evaluating)?;
        *state = FsmState::Evaluating;

        let verdict = self.evaluate_inner(principal, action, tool_name);

        let to_state = match &verdict {
            Ok(Verdict::PendingHuman) => FsmState::PendingHuman,
            Ok(Verdict::Allow { .. }) => FsmState::Approved,
            Err(_) => FsmState::Rejected,
        };
        fsm::validate_transition(*state, to_state).expect("EVALUATING always has an outbound edge to every terminal");
        let from_state = *state;
        *state = to_state;

        if !matches!(to_state, FsmState::PendingHuman) {
            // Non-pending decisions resolve the evaluation immediately; reset
            // so the next caller can enter EVALUATING.
            *state = FsmState::Idle;
        }
        drop(state);

        let decision = match &verdict {
            Ok(Verdict::Allow { monitoring_flag }) => Ok(PolicyDecision::allow(*monitoring_flag)),
            Ok(Verdict::PendingHuman) => {
                let token = ApprovalToken::issue(
                    action.id,
                    principal,
                    self.clock.now_unix_secs(),
                    self.approval_ttl_secs,
                );
                let decision = PolicyDecision::pending_human(token.secret.as_str());
                self.pending.lock().insert(
                    action.id,
                    Pending {
                        token,
                        state: FsmState::PendingHuman,
                    },
                );
                Ok(decision)
            }
            Err(e) => Err(e.clone()),
        };

        self.telemetry.record_event(TelemetryEvent::PolicyCheck {
            ids: ids.unwrap_or_default_ids(),
            allowed: decision.as_ref().map(|d| d.allowed).unwrap_or(false),
            requires_human_approval: decision
                .as_ref()
                .map(|d| d.requires_human_approval)
                .unwrap_or(false),
            reason: decision.as_ref().ok().and_then(|d| d.reason.clone()),
        });

        let decision_label = match &decision {
            Ok(d) if d.allowed => "allowed".to_string(),
            Ok(d) if d.requires_human_approval => "pending_human".to_string(),
            Ok(_) => "rejected".to_string(),
            Err(e) => format!("rejected:{e}"),
        };
        self.audit.append(
            self.clock.now_unix_secs(),
            principal.id,
            action.id,
            decision_label,
            from_state,
            to_state,
            None,
        );

        decision
    }

    fn evaluate_inner(
        &self,
        principal: &Principal,
        action: &Action,
        tool_name: Option<&str>,
    ) -> Result<Verdict, PolicyError> {
        // Step 2: allow-list check.
        if !action.allowed_tools.is_empty() {
            if let Some(tool) = tool_name {
                if !action.allowed_tools.iter().any(|t| t == tool) {
                    return Err(PolicyError::ToolNotAllowed { tool: tool.to_string() });
                }
            }
        }

        // Step 3: permission check.
        for required in &action.required_permissions {
            if !principal.holds(required) {
                return Err(PolicyError::InsufficientPermissions {
                    verb: required.verb.clone(),
                    resource: required.resource.clone(),
                });
            }
        }

        // Step 4: MCP external rules.
        if action.is_mcp_external {
            return match action.risk_tier {
                RiskTier::High | RiskTier::Critical => {
                    if action.risk_tier == RiskTier::Critical && !action.crv_validated {
                        return Err(PolicyError::McpCrvRequired);
                    }
                    Ok(Verdict::PendingHuman)
                }
                RiskTier::Medium => Ok(Verdict::Allow { monitoring_flag: true }),
                RiskTier::Low => Ok(Verdict::Allow { monitoring_flag: false }),
            };
        }

        // Step 5: risk-tier mapping.
        match action.risk_tier {
            RiskTier::Low => Ok(Verdict::Allow { monitoring_flag: false }),
            RiskTier::Medium => Ok(Verdict::Allow { monitoring_flag: true }),
            RiskTier::High | RiskTier::Critical => Ok(Verdict::PendingHuman),
        }
    }

    /// Redeems a single-use approval token for an action pending human
    /// sign-off.
    pub fn approve(&self, action_id: ActionId, presented_token: &str) -> bool {
        let mut pending = self.pending.lock();
        let Some(entry) = pending.get_mut(&action_id) else {
            return false;
        };
        let now = self.clock.now_unix_secs();
        if entry.token.secret.as_str() != presented_token || !entry.token.is_valid(now) {
            return false;
        }
        entry.token.used = true;
        let from_state = entry.state;
        entry.state = FsmState::Approved;
        let principal_id = entry.token.principal_snapshot.id;
        drop(pending);

        *self.state.lock() = FsmState::Idle;
        self.audit.append(
            now,
            principal_id,
            action_id,
            "approved",
            from_state,
            FsmState::Approved,
            Some(presented_token.to_string()),
        );
        true
    }

    /// Explicit human rejection of a pending action.
    pub fn reject(&self, action_id: ActionId) {
        let mut pending = self.pending.lock();
        if let Some(mut entry) = pending.remove(&action_id) {
            entry.state = FsmState::Rejected;
            let principal_id = entry.token.principal_snapshot.id;
            drop(pending);
            *self.state.lock() = FsmState::Idle;
            self.audit.append(
                self.clock.now_unix_secs(),
                principal_id,
                action_id,
                "rejected",
                FsmState::PendingHuman,
                FsmState::Rejected,
                None,
            );
        }
    }
}

trait CorrelationIdsOptionExt {
    fn unwrap_or_default_ids(self) -> CorrelationIds;
}

impl CorrelationIdsOptionExt for Option<CorrelationIds> {
    fn unwrap_or_default_ids(self) -> CorrelationIds {
        self.unwrap_or_else(|| CorrelationIds {
            workflow_id: crate::types::WorkflowId::new(),
            task_id: crate::types::TaskId::new(),
            step_id: crate::types::StepId::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::telemetry::InMemoryTelemetry;
    use crate::types::{Permission, PrincipalKind};

    fn gate() -> PolicyGate {
        PolicyGate::new(Arc::new(SystemClock), Arc::new(InMemoryTelemetry::new()))
    }

    #[test]
    fn low_risk_action_is_allowed() {
        let gate = gate();
        let principal = Principal::new(PrincipalKind::Human)
            .with_permission(Permission::new("read", "data"));
        let action = Action::new("read-report", RiskTier::Low).requiring(Permission::new("read", "data"));
        let decision = gate.evaluate(&principal, &action, None, None).unwrap();
        assert!(decision.allowed);
        assert!(!decision.requires_human_approval);
        assert_eq!(gate.audit.len(), 1);
    }

    #[test]
    fn missing_permission_is_rejected() {
        let gate = gate();
        let principal = Principal::new(PrincipalKind::Human);
        let action = Action::new("read-report", RiskTier::Low).requiring(Permission::new("read", "data"));
        let err = gate.evaluate(&principal, &action, None, None).unwrap_err();
        assert!(matches!(err, PolicyError::InsufficientPermissions { .. }));
    }

    #[test]
    fn tool_not_in_allow_list_is_rejected() {
        let gate = gate();
        let principal = Principal::new(PrincipalKind::Human);
        let action = Action::new("delete", RiskTier::Low).allowing_tools(["safe-tool".to_string()]);
        let err = gate
            .evaluate(&principal, &action, Some("other-tool"), None)
            .unwrap_err();
        assert!(matches!(err, PolicyError::ToolNotAllowed { .. }));
    }

    #[test]
    fn high_risk_action_gates_for_human_approval_then_approves() {
        let gate = gate();
        let principal = Principal::new(PrincipalKind::Human);
        let action = Action::new("delete-record", RiskTier::High);
        let decision = gate.evaluate(&principal, &action, None, None).unwrap();
        assert!(!decision.allowed);
        assert!(decision.requires_human_approval);
        let token = decision.approval_token.unwrap();

        assert!(gate.approve(action.id, &token));
        // P2: a second approve with the same token must fail.
        assert!(!gate.approve(action.id, &token));
        assert_eq!(gate.audit.len(), 2);
    }

    #[test]
    fn critical_mcp_action_without_crv_validation_is_a_violation() {
        let gate = gate();
        let principal = Principal::new(PrincipalKind::Human);
        let mut action = Action::new("external-call", RiskTier::Critical);
        action.is_mcp_external = true;
        action.crv_validated = false;
        let err = gate.evaluate(&principal, &action, None, None).unwrap_err();
        assert!(matches!(err, PolicyError::McpCrvRequired));
    }
}
