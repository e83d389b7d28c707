//! Durable outbox: exactly-once side effects for tool calls.
//!
//! Built on `StateStore::cas` for linearizable compare-and-set: every
//! state transition is committed to the store before the call returns, so
//! a crash mid-call can't produce a second observable side effect.

use crate::collaborators::SharedStateStore;
use crate::error::OutboxError;
use crate::idempotency::IdempotencyKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxState {
    Pending,
    InFlight,
    Committed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    state: OutboxState,
    attempts: u32,
    result: Option<Value>,
    error: Option<String>,
}

pub struct Outbox {
    store: SharedStateStore,
}

impl Outbox {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    fn storage_key(key: &IdempotencyKey) -> String {
        format!("outbox/{key}")
    }

    fn read(&self, storage_key: &str) -> Option<StoredEntry> {
        self.store
            .get(storage_key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// `executor_fn` is invoked at most once per call to `execute` —
    /// retries across attempts are driven by the caller (the reliability
    /// layer) re-invoking `execute` with the same key.
    pub async fn execute<F, Fut>(
        &self,
        key: IdempotencyKey,
        max_attempts: u32,
        timeout: Duration,
        executor_fn: F,
    ) -> Result<Value, OutboxError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, String>>,
    {
        let storage_key = Self::storage_key(&key);
        let current = self.read(&storage_key);

        if let Some(entry) = &current {
            if entry.state == OutboxState::Committed {
                return Ok(entry.result.clone().unwrap_or(Value::Null));
            }
            if entry.state == OutboxState::InFlight {
                return Err(OutboxError::Concurrent);
            }
            if entry.state == OutboxState::Failed && entry.attempts >= max_attempts {
                return Err(OutboxError::Failed(
                    entry.error.clone().unwrap_or_default(),
                ));
            }
        }

        let attempts = current.as_ref().map(|e| e.attempts).unwrap_or(0) + 1;
        let expected_raw = current.as_ref().and_then(|e| serde_json::to_value(e).ok());
        let in_flight = StoredEntry {
            state: OutboxState::InFlight,
            attempts,
            result: None,
            error: None,
        };
        let in_flight_raw = serde_json::to_value(&in_flight).expect("StoredEntry always serializes");

        if !self.store.cas(&storage_key, expected_raw, in_flight_raw.clone()) {
            return Err(OutboxError::Concurrent);
        }

        let outcome = tokio::time::timeout(timeout, executor_fn()).await;

        match outcome {
            Ok(Ok(result)) => {
                let committed = StoredEntry {
                    state: OutboxState::Committed,
                    attempts,
                    result: Some(result.clone()),
                    error: None,
                };
                let committed_raw =
                    serde_json::to_value(&committed).expect("StoredEntry always serializes");
                self.store.cas(&storage_key, Some(in_flight_raw), committed_raw);
                Ok(result)
            }
            Ok(Err(err)) => self.fail(&storage_key, in_flight_raw, attempts, max_attempts, err),
            Err(_elapsed) => self.fail(
                &storage_key,
                in_flight_raw,
                attempts,
                max_attempts,
                "tool call timed out".to_string(),
            ),
        }
    }

    fn fail(
        &self,
        storage_key: &str,
        in_flight_raw: Value,
        attempts: u32,
        max_attempts: u32,
        error: String,
    ) -> Result<Value, OutboxError> {
        let terminal = attempts >= max_attempts;
        let next_state = if terminal { OutboxState::Failed } else { OutboxState::Pending };
        let next = StoredEntry {
            state: next_state,
            attempts,
            result: None,
            error: Some(error.clone()),
        };
        let next_raw = serde_json::to_value(&next).expect("StoredEntry always serializes");
        self.store.cas(storage_key, Some(in_flight_raw), next_raw);

        if terminal {
            Err(OutboxError::Failed(error))
        } else {
            Err(OutboxError::Retryable { attempts, source: error })
        }
    }
}
