//! Core data model shared across every gate.
//!
//! Entities here are described by the invariants they maintain, not by
//! exhaustive field schemas — most are thin newtypes over `Uuid` so ids
//! from different domains (workflow/task/step/action) can't be
//! accidentally swapped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(WorkflowId);
uuid_id!(TaskId);
uuid_id!(StepId);
uuid_id!(PrincipalId);
uuid_id!(ActionId);
uuid_id!(CommitId);
uuid_id!(EventId);
uuid_id!(PostmortemId);
uuid_id!(FixId);

/// Kind of principal initiating an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    Agent,
    Human,
    Service,
}

/// Total ordering over data zones: `public < internal < confidential < restricted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataZone {
    Public,
    Internal,
    Confidential,
    Restricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

/// A single permission grant: `(verb, resource, optional intent, optional data_zone)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub verb: String,
    pub resource: String,
    pub intent: Option<String>,
    pub data_zone: Option<DataZone>,
}

impl Permission {
    pub fn new(verb: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            resource: resource.into(),
            intent: None,
            data_zone: None,
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_data_zone(mut self, zone: DataZone) -> Self {
        self.data_zone = Some(zone);
        self
    }

    /// Does this permission satisfy a required permission `required`?
    ///
    /// Same verb, same resource, intent match if required specifies one, and
    /// `self.data_zone >= required.data_zone` if either side specifies one.
    pub fn satisfies(&self, required: &Permission) -> bool {
        if self.verb != required.verb || self.resource != required.resource {
            return false;
        }
        if let Some(req_intent) = &required.intent {
            match &self.intent {
                Some(intent) if intent == req_intent => {}
                _ => return false,
            }
        }
        if let Some(req_zone) = required.data_zone {
            match self.data_zone {
                Some(zone) if zone >= req_zone => {}
                _ => return false,
            }
        }
        true
    }
}

/// Identity performing an action. Immutable for the duration of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(kind: PrincipalKind) -> Self {
        Self {
            id: PrincipalId::new(),
            kind,
            permissions: Vec::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn holds(&self, required: &Permission) -> bool {
        self.permissions.iter().any(|p| p.satisfies(required))
    }
}

/// A proposed operation evaluated by the Policy Gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub name: String,
    pub risk_tier: RiskTier,
    pub required_permissions: Vec<Permission>,
    pub intent: Option<String>,
    pub data_zone: Option<DataZone>,
    pub allowed_tools: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Whether this action represents a call to an external MCP tool — gates
    /// the MCP-specific policy rules.
    pub is_mcp_external: bool,
    /// Whether this action has been marked as CRV-validated by an upstream
    /// stage (used by the MEDIUM/CRITICAL MCP rules).
    pub crv_validated: bool,
}

impl Action {
    pub fn new(name: impl Into<String>, risk_tier: RiskTier) -> Self {
        Self {
            id: ActionId::new(),
            name: name.into(),
            risk_tier,
            required_permissions: Vec::new(),
            intent: None,
            data_zone: None,
            allowed_tools: Vec::new(),
            metadata: BTreeMap::new(),
            is_mcp_external: false,
            crv_validated: false,
        }
    }

    pub fn requiring(mut self, permission: Permission) -> Self {
        self.required_permissions.push(permission);
        self
    }

    pub fn allowing_tools(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.allowed_tools.extend(tools);
        self
    }
}

/// A unit submitted to the CRV gate: a proposed state change or tool
/// input/output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub payload: serde_json::Value,
    pub previous_state: Option<serde_json::Value>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Commit {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: CommitId::new(),
            payload,
            previous_state: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_previous(mut self, previous: serde_json::Value) -> Self {
        self.previous_state = Some(previous);
        self
    }
}

/// Strategy used to derive idempotency behavior for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyStrategy {
    CacheReplay,
    Natural,
    RequestId,
    None,
}

/// The inverse operation of a tool call, used by reliability rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationAction {
    pub tool_id: String,
    pub params_template: serde_json::Value,
}

/// Static description of a callable tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    pub name: String,
    pub input_schema: Option<serde_json::Value>,
    pub output_schema: Option<serde_json::Value>,
    pub required_params: Vec<String>,
    pub has_side_effects: bool,
    pub idempotency_strategy: IdempotencyStrategy,
    pub compensation: Option<CompensationAction>,
    pub timeout_ms: u64,
}

impl ToolSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input_schema: None,
            output_schema: None,
            required_params: Vec::new(),
            has_side_effects: false,
            idempotency_strategy: IdempotencyStrategy::None,
            compensation: None,
            timeout_ms: 30_000,
        }
    }
}

/// Resource caps used by the Effort Evaluator and Reliability Layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceCaps {
    pub cpu_time_ms: u64,
    pub memory_bytes: u64,
    pub token_limit: u64,
    pub iteration_cap: u64,
}

impl Default for ResourceCaps {
    fn default() -> Self {
        Self {
            cpu_time_ms: 10_000,
            memory_bytes: 1024 * 1024 * 1024,
            token_limit: 100_000,
            iteration_cap: 1_000,
        }
    }
}

/// The (workflow, task, step) triple every stage of the interlock shares as
/// its correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationIds {
    pub workflow_id: WorkflowId,
    pub task_id: TaskId,
    pub step_id: StepId,
}
