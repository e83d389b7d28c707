//! Fault injection registry.
//!
//! Named injection points with a per-point probability, disabled by
//! default, guarded by an explicit `enable()` call. Updates are a
//! copy-on-write swap behind a version counter so readers never observe a
//! half-updated table.

use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Latency,
    Error,
    Timeout,
    Crash,
    Throttle,
    Partial,
    Unavailable,
}

#[derive(Debug, Clone, Copy)]
struct InjectionPoint {
    kind: FaultKind,
    probability: f64,
    enabled: bool,
}

#[derive(Default)]
pub struct FaultInjector {
    points: RwLock<Arc<HashMap<String, InjectionPoint>>>,
    version: AtomicU64,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, kind: FaultKind, probability: f64) {
        self.mutate(move |map| {
            map.insert(
                name.into(),
                InjectionPoint {
                    kind,
                    probability: probability.clamp(0.0, 1.0),
                    enabled: false,
                },
            );
        });
    }

    pub fn enable(&self, name: &str) {
        self.mutate(|map| {
            if let Some(point) = map.get_mut(name) {
                point.enabled = true;
            }
        });
    }

    pub fn disable(&self, name: &str) {
        self.mutate(|map| {
            if let Some(point) = map.get_mut(name) {
                point.enabled = false;
            }
        });
    }

    fn mutate(&self, f: impl FnOnce(&mut HashMap<String, InjectionPoint>)) {
        let mut guard = self.points.write();
        let mut next = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Rolls the dice for `name`; returns the fault to inject, if any. A
    /// disabled or unregistered point never fires.
    pub fn maybe_inject(&self, name: &str, rng: &mut impl Rng) -> Option<FaultKind> {
        let snapshot = self.points.read().clone();
        let point = snapshot.get(name)?;
        if !point.enabled {
            return None;
        }
        if rng.gen_range(0.0..1.0) < point.probability {
            Some(point.kind)
        } else {
            None
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
