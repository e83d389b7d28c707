//! Simulator: property-based testing harness.
//!
//! A seeded RNG drives a mix of valid / edge-case / invalid operations
//! against the kernel and asserts the universal invariants hold after
//! each one.

use crate::clock::SystemClock;
use crate::policy::PolicyGate;
use crate::telemetry::InMemoryTelemetry;
use crate::types::{Action, Permission, Principal, PrincipalKind, RiskTier};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct OperationDistribution {
    pub valid_ops: f64,
    pub edge_cases: f64,
    pub invalid_ops: f64,
}

impl Default for OperationDistribution {
    fn default() -> Self {
        Self {
            valid_ops: 0.70,
            edge_cases: 0.20,
            invalid_ops: 0.10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub seed: u64,
    pub total_operations: u64,
    pub operation_distribution: OperationDistribution,
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            total_operations: 1_000,
            operation_distribution: OperationDistribution::default(),
            stop_on_first_violation: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub operation_index: u64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub operations_run: u64,
    pub violations: Vec<InvariantViolation>,
}

enum GeneratedOp {
    Valid,
    EdgeCase,
    Invalid,
}

fn pick_op(rng: &mut StdRng, dist: &OperationDistribution) -> GeneratedOp {
    let roll: f64 = rng.gen_range(0.0..1.0);
    if roll < dist.valid_ops {
        GeneratedOp::Valid
    } else if roll < dist.valid_ops + dist.edge_cases {
        GeneratedOp::EdgeCase
    } else {
        GeneratedOp::Invalid
    }
}

fn random_risk_tier(rng: &mut StdRng) -> RiskTier {
    match rng.gen_range(0..4) {
        0 => RiskTier::Low,
        1 => RiskTier::Medium,
        2 => RiskTier::High,
        _ => RiskTier::Critical,
    }
}

/// Runs `config.total_operations` randomized evaluate/approve cycles
/// against a fresh `PolicyGate` and checks P2, P3, and P8 after each one.
pub fn run_simulator(config: &SimulatorConfig) -> SimulationReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let gate = PolicyGate::new(Arc::new(SystemClock), Arc::new(InMemoryTelemetry::new()));
    let mut violations = Vec::new();
    let mut audit_len_before = 0usize;

    for i in 0..config.total_operations {
        let op = pick_op(&mut rng, &config.operation_distribution);

        let (principal, action) = match op {
            GeneratedOp::Valid => {
                let principal = Principal::new(PrincipalKind::Human).with_permission(Permission::new("read", "data"));
                let action = Action::new("read-report", RiskTier::Low).requiring(Permission::new("read", "data"));
                (principal, action)
            }
            GeneratedOp::EdgeCase => {
                let principal = Principal::new(PrincipalKind::Agent);
                let action = Action::new("boundary-op", random_risk_tier(&mut rng));
                (principal, action)
            }
            GeneratedOp::Invalid => {
                // No permissions granted but the action requires one: must
                // always be rejected, never silently allowed.
                let principal = Principal::new(PrincipalKind::Service);
                let action = Action::new("write-op", RiskTier::Medium).requiring(Permission::new("write", "data"));
                (principal, action)
            }
        };

        let result = gate.evaluate(&principal, &action, None, None);

        // P3: every allowed=true call has a corresponding audit entry
        // written before the return.
        let audit_len_after = gate.audit.len();
        if let Ok(decision) = &result {
            if decision.allowed && audit_len_after <= audit_len_before {
                violations.push(InvariantViolation {
                    operation_index: i,
                    description: "P3 violated: allowed=true with no new audit entry".to_string(),
                });
            }
        }
        audit_len_before = audit_len_after;

        // P8: audit entries are append-only and timestamp-monotonic.
        let entries = gate.audit.entries();
        if entries.windows(2).any(|w| w[0].timestamp > w[1].timestamp) {
            violations.push(InvariantViolation {
                operation_index: i,
                description: "P8 violated: audit timestamps not monotonic".to_string(),
            });
        }
        if !gate.audit.verify_integrity() {
            violations.push(InvariantViolation {
                operation_index: i,
                description: "P8 violated: audit hash chain broken".to_string(),
            });
        }

        // P2: approving with a bad token never succeeds, and approving with
        // the right token twice only succeeds once.
        if let Ok(decision) = &result {
            if let Some(token) = &decision.approval_token {
                let bad = format!("not-{token}");
                if gate.approve(action.id, &bad) {
                    violations.push(InvariantViolation {
                        operation_index: i,
                        description: "P2 violated: forged token was accepted".to_string(),
                    });
                }
                let first = gate.approve(action.id, token);
                let second = gate.approve(action.id, token);
                if first && second {
                    violations.push(InvariantViolation {
                        operation_index: i,
                        description: "P2 violated: same token approved twice".to_string(),
                    });
                }
            }
        }

        if config.stop_on_first_violation && !violations.is_empty() {
            return SimulationReport {
                operations_run: i + 1,
                violations,
            };
        }
    }

    SimulationReport {
        operations_run: config.total_operations,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulator_finds_no_invariant_violations_over_many_seeds() {
        for seed in 0..5 {
            let config = SimulatorConfig {
                seed,
                total_operations: 200,
                ..SimulatorConfig::default()
            };
            let report = run_simulator(&config);
            assert!(report.violations.is_empty(), "seed {seed} violations: {:?}", report.violations);
        }
    }
}
