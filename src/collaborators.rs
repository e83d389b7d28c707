//! External collaborators consumed by the core: a durable state store, an
//! append-only event log, and a tool registry. Production deployments swap
//! these for real backends; the in-memory versions here exist so the
//! kernel is runnable and testable standalone.

use crate::types::ToolSpec;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Durable key/value store with compare-and-set.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: &str, value: Value);
    /// Atomically replace `key`'s value with `new` iff it currently equals
    /// `expected` (or both are `None`, for "create if absent").
    fn cas(&self, key: &str, expected: Option<Value>, new: Value) -> bool;
    fn list(&self, prefix: &str) -> Vec<String>;
}

#[derive(Default)]
pub struct InMemoryStateStore {
    inner: DashMap<String, Value>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).map(|v| v.clone())
    }

    fn put(&self, key: &str, value: Value) {
        self.inner.insert(key.to_string(), value);
    }

    fn cas(&self, key: &str, expected: Option<Value>, new: Value) -> bool {
        match self.inner.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut e) => {
                if Some(e.get().clone()) == expected {
                    e.insert(new);
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                if expected.is_none() {
                    e.insert(new);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn list(&self, prefix: &str) -> Vec<String> {
        self.inner
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect()
    }
}

/// Append-only, monotonically sequenced durable log. This is the external
/// collaborator; it is distinct from the Policy Gate's own hash-chained
/// audit log in `policy::audit`, which is internal state the FSM
/// exclusively owns.
pub trait EventLog: Send + Sync {
    fn append(&self, entry: Value) -> u64;
    fn read_from(&self, from_seq: u64) -> Vec<(u64, Value)>;
}

#[derive(Default)]
pub struct InMemoryEventLog {
    inner: Mutex<Vec<Value>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, entry: Value) -> u64 {
        let mut guard = self.inner.lock();
        guard.push(entry);
        (guard.len() - 1) as u64
    }

    fn read_from(&self, from_seq: u64) -> Vec<(u64, Value)> {
        let guard = self.inner.lock();
        guard
            .iter()
            .enumerate()
            .skip(from_seq as usize)
            .map(|(i, v)| (i as u64, v.clone()))
            .collect()
    }
}

/// Resolves a tool id to its specification.
pub trait ToolRegistry: Send + Sync {
    fn get(&self, tool_id: &str) -> Option<ToolSpec>;
}

#[derive(Default)]
pub struct InMemoryToolRegistry {
    inner: DashMap<String, ToolSpec>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: ToolSpec) {
        self.inner.insert(spec.id.clone(), spec);
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    fn get(&self, tool_id: &str) -> Option<ToolSpec> {
        self.inner.get(tool_id).map(|v| v.clone())
    }
}

pub type SharedStateStore = Arc<dyn StateStore>;
pub type SharedEventLog = Arc<dyn EventLog>;
pub type SharedToolRegistry = Arc<dyn ToolRegistry>;
