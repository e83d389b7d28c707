//! Error taxonomy surfaced to callers.
//!
//! Every failure is a variant of [`KernelError`], which aggregates each
//! component's own error enum. No stack traces cross this boundary —
//! internal context goes to `tracing`/telemetry only.

use crate::types::ActionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("policy denied: {0}")]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Crv(#[from] CrvError),

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Reliability(#[from] ReliabilityError),

    #[error(transparent)]
    Reflexion(#[from] ReflexionError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    Timeout,

    #[error("operation not available in current degradation mode: {operation}")]
    Degraded { operation: String },

    #[error("fatal error, restart required: {0}")]
    Fatal(String),
}

impl KernelError {
    /// The closed taxonomy code, for callers that want to switch on a
    /// stable string rather than match the Rust enum.
    pub fn taxonomy_code(&self) -> &'static str {
        match self {
            KernelError::Policy(PolicyError::RequiresHumanApproval { .. }) => "APPROVAL_REQUIRED",
            KernelError::Policy(_) => "POLICY_DENIED",
            KernelError::Crv(_) => "CRV_BLOCKED",
            KernelError::Outbox(OutboxError::Concurrent) => "OUTBOX_BUSY",
            KernelError::Outbox(_) => "RETRY_EXHAUSTED",
            KernelError::Tool(ToolError::SchemaInvalid(_)) => "SCHEMA_INVALID",
            KernelError::Tool(_) => "TOOL_ERROR",
            KernelError::Reliability(ReliabilityError::Exhausted { .. }) => "RETRY_EXHAUSTED",
            KernelError::Reliability(_) => "RETRY_EXHAUSTED",
            KernelError::Reflexion(_) => "RETRY_EXHAUSTED",
            KernelError::Cancelled => "CANCELLED",
            KernelError::Timeout => "TIMEOUT",
            KernelError::Degraded { .. } => "DEGRADED",
            KernelError::Fatal(_) => "FATAL",
        }
    }

    /// Whether this call may be retried by the reliability layer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KernelError::Timeout
                | KernelError::Reliability(ReliabilityError::Transient(_))
                | KernelError::Outbox(OutboxError::Concurrent)
                | KernelError::Outbox(OutboxError::Retryable { .. })
        )
    }

    pub fn should_escalate(&self) -> bool {
        matches!(
            self,
            KernelError::Fatal(_)
                | KernelError::Policy(PolicyError::RequiresHumanApproval { .. })
                | KernelError::Reflexion(ReflexionError::Escalate(_))
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("missing principal or action")]
    InvalidRequest,

    #[error("tool {tool} not in action allow-list")]
    ToolNotAllowed { tool: String },

    #[error("principal lacks required permission: {verb} on {resource}")]
    InsufficientPermissions { verb: String, resource: String },

    #[error("critical MCP action lacks required CRV validation")]
    McpCrvRequired,

    #[error("action {action_id} requires human approval")]
    RequiresHumanApproval { action_id: ActionId },

    #[error("state machine is mid-evaluation for this instance")]
    EvaluationInProgress,

    #[error("approval token invalid, expired, or already used")]
    InvalidApproval,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrvError {
    #[error("commit blocked by validator, code={code:?}")]
    Blocked {
        code: FailureCode,
        remediation: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureCode {
    ToolError,
    LowConfidence,
    Conflict,
    NonDeterminism,
    PolicyViolation,
    MissingData,
    OutOfScope,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OutboxError {
    #[error("concurrent invocation holds the in-flight slot for this key")]
    Concurrent,

    #[error("attempt {attempts} failed, under budget, hand to reliability layer: {source}")]
    Retryable { attempts: u32, source: String },

    #[error("entry reached its attempt budget and is terminally failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    #[error("schema validation failed: {0}")]
    SchemaInvalid(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("tool call timed out")]
    Timeout,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReliabilityError {
    #[error("transient error: {0}")]
    Transient(String),

    #[error("permanent error: {0}")]
    Permanent(String),

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("circuit open for dependency: {0}")]
    CircuitOpen(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReflexionError {
    #[error("no viable fix could be proposed for taxonomy {0:?}")]
    NoFixAvailable(FailureCode),

    #[error("fix attempt budget exhausted for task")]
    AttemptBudgetExhausted,

    #[error("proposed fix failed sandbox validation: {0}")]
    SandboxRejected(String),

    #[error("escalating to human: {0}")]
    Escalate(String),
}
