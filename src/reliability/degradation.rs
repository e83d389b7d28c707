//! Graceful degradation mode machine.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    Emergency,
    Minimal,
    Partial,
    Full,
}

/// Healthy-fraction floors for each mode, in descending order. Defaults to
/// the spec's 90/70/40 split; a deployer can narrow or widen the bands via
/// `KernelConfig::degradation_thresholds`.
#[derive(Debug, Clone, Copy)]
pub struct ModeThresholds {
    pub full_at_or_above: f64,
    pub partial_at_or_above: f64,
    pub minimal_at_or_above: f64,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            full_at_or_above: 0.90,
            partial_at_or_above: 0.70,
            minimal_at_or_above: 0.40,
        }
    }
}

impl Mode {
    fn from_healthy_fraction(fraction: f64, thresholds: &ModeThresholds) -> Mode {
        if fraction >= thresholds.full_at_or_above {
            Mode::Full
        } else if fraction >= thresholds.partial_at_or_above {
            Mode::Partial
        } else if fraction >= thresholds.minimal_at_or_above {
            Mode::Minimal
        } else {
            Mode::Emergency
        }
    }
}

#[derive(Default)]
pub struct HealthRegistry {
    services: DashMap<String, bool>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, service: impl Into<String>, healthy: bool) {
        self.services.insert(service.into(), healthy);
    }

    pub fn healthy_fraction(&self) -> f64 {
        if self.services.is_empty() {
            return 1.0;
        }
        let healthy = self.services.iter().filter(|e| *e.value()).count();
        healthy as f64 / self.services.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    Cache,
    Default,
    Stub,
    Skip,
    Fail,
}

struct OperationPolicy {
    required_mode: Mode,
    fallback: FallbackStrategy,
}

#[derive(Default)]
pub struct OperationRegistry {
    operations: DashMap<String, OperationPolicy>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, required_mode: Mode, fallback: FallbackStrategy) {
        self.operations.insert(name.into(), OperationPolicy { required_mode, fallback });
    }
}

struct CacheSlot {
    value: serde_json::Value,
    expires_at: Instant,
}

pub struct DegradationController {
    health: HealthRegistry,
    operations: OperationRegistry,
    cache: DashMap<String, CacheSlot>,
    current_mode: Mutex<Mode>,
    thresholds: ModeThresholds,
}

impl Default for DegradationController {
    fn default() -> Self {
        Self::with_thresholds(ModeThresholds::default())
    }
}

#[derive(Debug, Clone)]
pub enum OperationOutcome {
    /// Primary path allowed (mode satisfies `required_mode`).
    Proceed,
    /// Primary path denied; resolved via fallback to a cached value.
    FallbackCache(serde_json::Value),
    /// Primary path denied; resolved via fallback to a default/stub/skip
    /// without touching real state.
    Fallback(FallbackStrategy),
    /// Primary path denied and no fallback could be resolved.
    Denied,
}

impl DegradationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: ModeThresholds) -> Self {
        Self {
            health: HealthRegistry::default(),
            operations: OperationRegistry::default(),
            cache: DashMap::new(),
            current_mode: Mutex::new(Mode::Full),
            thresholds,
        }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    /// Recomputes and returns the current mode from the health registry's
    /// healthy fraction, per this controller's configured thresholds
    /// (90/70/40 by default, per spec).
    pub fn recompute_mode(&self) -> Mode {
        let mode = Mode::from_healthy_fraction(self.health.healthy_fraction(), &self.thresholds);
        *self.current_mode.lock() = mode;
        mode
    }

    pub fn current_mode(&self) -> Mode {
        *self.current_mode.lock()
    }

    pub fn put_cache(&self, operation: impl Into<String>, value: serde_json::Value, ttl: std::time::Duration) {
        self.cache.insert(
            operation.into(),
            CacheSlot {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// When the current mode is worse than an operation requires, the
    /// request is resolved via the operation's configured fallback
    /// strategy, or the strategy's own failure if the fallback can't
    /// resolve (e.g. cache miss/expired).
    pub fn check(&self, operation: &str) -> OperationOutcome {
        let Some(policy) = self.operations.operations.get(operation) else {
            return OperationOutcome::Proceed;
        };
        let mode = self.current_mode();
        if mode >= policy.required_mode {
            return OperationOutcome::Proceed;
        }

        match policy.fallback {
            FallbackStrategy::Cache => match self.cache.get(operation) {
                Some(slot) if slot.expires_at > Instant::now() => {
                    OperationOutcome::FallbackCache(slot.value.clone())
                }
                _ => OperationOutcome::Denied,
            },
            other => OperationOutcome::Fallback(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_fraction_maps_to_full_mode_above_90_percent() {
        let health = HealthRegistry::new();
        for i in 0..10 {
            health.report(format!("svc-{i}"), i != 0);
        }
        assert_eq!(Mode::from_healthy_fraction(health.healthy_fraction(), &ModeThresholds::default()), Mode::Full);
    }

    #[test]
    fn low_healthy_fraction_triggers_emergency() {
        let health = HealthRegistry::new();
        for i in 0..10 {
            health.report(format!("svc-{i}"), i < 2);
        }
        assert_eq!(Mode::from_healthy_fraction(health.healthy_fraction(), &ModeThresholds::default()), Mode::Emergency);
    }

    #[test]
    fn operation_requiring_better_mode_than_current_is_denied_or_falls_back() {
        let controller = DegradationController::new();
        for i in 0..10 {
            controller.health().report(format!("svc-{i}"), i < 3);
        }
        controller.recompute_mode();
        controller
            .operations()
            .register("risky-write", Mode::Full, FallbackStrategy::Fail);
        match controller.check("risky-write") {
            OperationOutcome::Fallback(FallbackStrategy::Fail) => {}
            other => panic!("expected Fallback(Fail), got {other:?}"),
        }
    }

    #[test]
    fn cache_fallback_returns_cached_value_when_fresh() {
        let controller = DegradationController::new();
        for i in 0..10 {
            controller.health().report(format!("svc-{i}"), i < 3);
        }
        controller.recompute_mode();
        controller
            .operations()
            .register("read-report", Mode::Full, FallbackStrategy::Cache);
        controller.put_cache("read-report", serde_json::json!({"stale": true}), std::time::Duration::from_secs(60));
        match controller.check("read-report") {
            OperationOutcome::FallbackCache(v) => assert_eq!(v, serde_json::json!({"stale": true})),
            other => panic!("expected FallbackCache, got {other:?}"),
        }
    }
}
