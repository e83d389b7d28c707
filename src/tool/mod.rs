//! Tool Wrapper: the boundary every tool invocation crosses.
//!
//! Routes a tool call through schema validation, sanitized telemetry,
//! optional outbox-backed idempotency, or an optional result cache, with a
//! timeout race around the actual execution.

pub mod schema;

use crate::collaborators::SharedToolRegistry;
use crate::error::ToolError;
use crate::idempotency::outbox::Outbox;
use crate::idempotency::IdempotencyKey;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{CorrelationIds, IdempotencyStrategy, ToolSpec};
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const REDACTED_KEY_SUBSTRINGS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "token",
    "api_key",
    "access_token",
    "private_key",
    "credentials",
    "auth",
    "authorization",
];

/// Redacts any object key (at any nesting depth) whose name, lowercased,
/// contains a sensitive substring.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let lower = k.to_lowercase();
                if REDACTED_KEY_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
                    out.insert(k.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(k.clone(), sanitize(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub replayed: bool,
}

/// A cache entry for tools routed through the result cache rather than the
/// outbox.
#[derive(Clone)]
struct CacheEntry {
    result: Value,
    expires_at: std::time::Instant,
}

#[derive(Default)]
pub struct ResultCache {
    inner: DashMap<IdempotencyKey, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &IdempotencyKey) -> Option<Value> {
        let entry = self.inner.get(key)?;
        if entry.expires_at > std::time::Instant::now() {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    fn put(&self, key: IdempotencyKey, result: Value, ttl: Duration) {
        self.inner.insert(
            key,
            CacheEntry {
                result,
                expires_at: std::time::Instant::now() + ttl,
            },
        );
    }
}

pub struct ToolExecutionContext {
    pub ids: CorrelationIds,
    pub telemetry: Arc<dyn TelemetryCollector>,
    pub outbox: Option<Arc<Outbox>>,
    pub cache: Option<Arc<ResultCache>>,
}

pub struct ToolWrapper {
    registry: SharedToolRegistry,
}

impl ToolWrapper {
    pub fn new(registry: SharedToolRegistry) -> Self {
        Self { registry }
    }

    /// `invoke` is the tool's actual side-effecting call; it is awaited
    /// under the tool's configured timeout regardless of which routing
    /// branch is taken.
    pub async fn execute<F, Fut>(
        &self,
        tool_id: &str,
        params: Value,
        ctx: &ToolExecutionContext,
        invoke: F,
    ) -> ToolResult
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Value, String>>,
    {
        let Some(spec) = self.registry.get(tool_id) else {
            return ToolResult {
                success: false,
                data: None,
                error: Some(ToolError::ExecutionFailed(format!("unknown tool {tool_id}")).to_string()),
                replayed: false,
            };
        };

        ctx.telemetry.record_event(TelemetryEvent::ToolCall {
            ids: ctx.ids,
            tool_id: tool_id.to_string(),
            sanitized_params: sanitize(&params),
        });

        if let Some(input_schema) = &spec.input_schema {
            if let Err(errors) = schema::validate(input_schema, &params) {
                let message = errors
                    .into_iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                return ToolResult {
                    success: false,
                    data: None,
                    error: Some(ToolError::SchemaInvalid(message).to_string()),
                    replayed: false,
                };
            }
        }

        if let Some(missing) = first_missing_param(&spec, &params) {
            return ToolResult {
                success: false,
                data: None,
                error: Some(ToolError::MissingParameter(missing).to_string()),
                replayed: false,
            };
        }

        let timeout = Duration::from_millis(spec.timeout_ms);

        if spec.has_side_effects {
            if let Some(outbox) = &ctx.outbox {
                return self.run_via_outbox(&spec, params, ctx, outbox, timeout, invoke).await;
            }
            if let Some(cache) = &ctx.cache {
                return self.run_via_cache(&spec, params, ctx, cache, timeout, invoke).await;
            }
        }

        self.run_direct(&spec, params, timeout, invoke).await
    }

    async fn run_via_outbox<F, Fut>(
        &self,
        spec: &ToolSpec,
        params: Value,
        ctx: &ToolExecutionContext,
        outbox: &Arc<Outbox>,
        timeout: Duration,
        invoke: F,
    ) -> ToolResult
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Value, String>>,
    {
        let key = IdempotencyKey::derive(
            &ctx.ids.workflow_id.to_string(),
            &ctx.ids.task_id.to_string(),
            &ctx.ids.step_id.to_string(),
            &spec.id,
            &params,
        );
        let output_schema = spec.output_schema.clone();
        let outcome = outbox
            .execute(key, 3, timeout, move || async move {
                let result = invoke(params).await?;
                if let Some(schema) = &output_schema {
                    if let Err(errors) = schema::validate(schema, &result) {
                        return Err(errors
                            .into_iter()
                            .map(|e| e.to_string())
                            .collect::<Vec<_>>()
                            .join("; "));
                    }
                }
                Ok(result)
            })
            .await;

        match outcome {
            Ok(result) => ToolResult {
                success: true,
                data: Some(result),
                error: None,
                replayed: false,
            },
            Err(e) => ToolResult {
                success: false,
                data: None,
                error: Some(e.to_string()),
                replayed: false,
            },
        }
    }

    async fn run_via_cache<F, Fut>(
        &self,
        spec: &ToolSpec,
        params: Value,
        ctx: &ToolExecutionContext,
        cache: &Arc<ResultCache>,
        timeout: Duration,
        invoke: F,
    ) -> ToolResult
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Value, String>>,
    {
        let key = IdempotencyKey::derive(
            &ctx.ids.workflow_id.to_string(),
            &ctx.ids.task_id.to_string(),
            &ctx.ids.step_id.to_string(),
            &spec.id,
            &params,
        );

        if let Some(cached) = cache.get(&key) {
            return ToolResult {
                success: true,
                data: Some(cached),
                error: None,
                replayed: true,
            };
        }

        let result = self.run_direct(spec, params, timeout, invoke).await;
        if result.success {
            if let Some(data) = &result.data {
                cache.put(key, data.clone(), Duration::from_secs(300));
            }
        }
        result
    }

    async fn run_direct<F, Fut>(&self, spec: &ToolSpec, params: Value, timeout: Duration, invoke: F) -> ToolResult
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Value, String>>,
    {
        match tokio::time::timeout(timeout, invoke(params)).await {
            Ok(Ok(result)) => {
                if let Some(schema) = &spec.output_schema {
                    if let Err(errors) = schema::validate(schema, &result) {
                        let message = errors.into_iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                        return ToolResult {
                            success: false,
                            data: None,
                            error: Some(ToolError::SchemaInvalid(message).to_string()),
                            replayed: false,
                        };
                    }
                }
                ToolResult {
                    success: true,
                    data: Some(result),
                    error: None,
                    replayed: false,
                }
            }
            Ok(Err(e)) => ToolResult {
                success: false,
                data: None,
                error: Some(ToolError::ExecutionFailed(e).to_string()),
                replayed: false,
            },
            Err(_elapsed) => ToolResult {
                success: false,
                data: None,
                error: Some(ToolError::Timeout.to_string()),
                replayed: false,
            },
        }
    }
}

fn first_missing_param(spec: &ToolSpec, params: &Value) -> Option<String> {
    let obj = params.as_object();
    spec.required_params
        .iter()
        .find(|p| !obj.map(|m| m.contains_key(p.as_str())).unwrap_or(false))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryToolRegistry;
    use crate::telemetry::InMemoryTelemetry;
    use crate::types::{TaskId, WorkflowId};
    use serde_json::json;

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext {
            ids: CorrelationIds {
                workflow_id: WorkflowId::new(),
                task_id: TaskId::new(),
                step_id: crate::types::StepId::new(),
            },
            telemetry: Arc::new(InMemoryTelemetry::new()),
            outbox: None,
            cache: None,
        }
    }

    #[test]
    fn sensitive_keys_are_redacted_at_any_depth() {
        let value = json!({"user": "alice", "nested": {"api_key": "secret-value"}});
        let sanitized = sanitize(&value);
        assert_eq!(sanitized["nested"]["api_key"], json!("[REDACTED]"));
        assert_eq!(sanitized["user"], json!("alice"));
    }

    #[tokio::test]
    async fn missing_required_param_short_circuits_without_invoking() {
        let registry = Arc::new(InMemoryToolRegistry::new());
        let mut spec = ToolSpec::new("fetch", "Fetch");
        spec.required_params = vec!["report_id".to_string()];
        registry.register(spec);
        let wrapper = ToolWrapper::new(registry);
        let ctx = ctx();

        let result = wrapper
            .execute("fetch", json!({}), &ctx, |_| async { Ok(json!({})) })
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("report_id"));
    }

    #[tokio::test]
    async fn direct_execution_returns_result_on_success() {
        let registry = Arc::new(InMemoryToolRegistry::new());
        registry.register(ToolSpec::new("fetch", "Fetch"));
        let wrapper = ToolWrapper::new(registry);
        let ctx = ctx();

        let result = wrapper
            .execute("fetch", json!({"report_id": "r42"}), &ctx, |_| async {
                Ok(json!({"title": "Q3"}))
            })
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap(), json!({"title": "Q3"}));
    }

    #[tokio::test]
    async fn cache_replays_without_reinvoking() {
        let registry = Arc::new(InMemoryToolRegistry::new());
        let mut spec = ToolSpec::new("fetch", "Fetch");
        spec.has_side_effects = true;
        registry.register(spec);
        let wrapper = ToolWrapper::new(registry);
        let mut ctx = ctx();
        ctx.cache = Some(Arc::new(ResultCache::new()));

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = calls.clone();
        let first = wrapper
            .execute("fetch", json!({"x": 1}), &ctx, move |_| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!({"v": 1}))
                }
            })
            .await;
        assert!(first.success && !first.replayed);

        let calls3 = calls.clone();
        let second = wrapper
            .execute("fetch", json!({"x": 1}), &ctx, move |_| {
                let calls = calls3.clone();
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!({"v": 1}))
                }
            })
            .await;
        assert!(second.success && second.replayed);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
