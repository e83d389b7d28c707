//! Circuit Reasoning Validation Gate.
//!
//! Deterministic, pure-function validation of a proposed `Commit`, run as
//! an ordered pipeline of independent validators rather than one opaque
//! check.

pub mod validators;

use crate::error::{CrvError, FailureCode};
use crate::types::Commit;

/// Result of a single validator run against a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub validator_name: String,
    pub valid: bool,
    pub reason: Option<String>,
    pub confidence: f64,
    pub failure_code: Option<FailureCode>,
}

/// A pure function of `commit -> { valid, reason?, confidence }`.
/// Implementations must be deterministic: identical commit in, identical
/// result out.
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, commit: &Commit) -> ValidationResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    Retry,
    AskUser,
    Escalate,
    Ignore,
}

/// Outcome of `CrvGate::validate`.
#[derive(Debug, Clone)]
pub struct CrvReport {
    pub passed: bool,
    pub validation_results: Vec<ValidationResult>,
    pub blocked_commit: bool,
    pub failure_code: Option<FailureCode>,
    pub remediation: Option<String>,
}

pub struct CrvGateConfig {
    pub block_on_failure: bool,
    pub required_confidence: Option<f64>,
    pub recovery_strategy: RecoveryStrategy,
    /// Stop running validators after the first failure rather than
    /// collecting every result.
    pub short_circuit: bool,
}

impl Default for CrvGateConfig {
    fn default() -> Self {
        Self {
            block_on_failure: true,
            required_confidence: None,
            recovery_strategy: RecoveryStrategy::Escalate,
            short_circuit: false,
        }
    }
}

pub struct CrvGate {
    validators: Vec<Box<dyn Validator>>,
    config: CrvGateConfig,
}

impl CrvGate {
    pub fn new(validators: Vec<Box<dyn Validator>>, config: CrvGateConfig) -> Self {
        Self { validators, config }
    }

    /// Runs every configured validator over `commit` and rolls the results
    /// up into one verdict.
    pub fn validate(&self, commit: &Commit) -> CrvReport {
        let mut results = Vec::with_capacity(self.validators.len());
        for validator in &self.validators {
            let result = validator.validate(commit);
            let failed = !result.valid
                || self
                    .config
                    .required_confidence
                    .is_some_and(|threshold| result.confidence < threshold);
            results.push(result);
            if failed && self.config.short_circuit {
                break;
            }
        }

        let passed = results.iter().all(|r| r.valid)
            && match self.config.required_confidence {
                Some(threshold) => results.iter().all(|r| r.confidence >= threshold),
                None => true,
            };

        let blocked_commit = !passed && self.config.block_on_failure;

        let failure_code = if blocked_commit {
            results
                .iter()
                .find(|r| {
                    !r.valid
                        || self
                            .config
                            .required_confidence
                            .is_some_and(|t| r.confidence < t)
                })
                .and_then(|r| r.failure_code)
                .or(Some(FailureCode::LowConfidence))
        } else {
            None
        };

        let remediation = failure_code.map(|_| self.remediation_text());

        CrvReport {
            passed,
            validation_results: results,
            blocked_commit,
            failure_code,
            remediation,
        }
    }

    fn remediation_text(&self) -> String {
        match self.config.recovery_strategy {
            RecoveryStrategy::Retry => "retry with corrected input".to_string(),
            RecoveryStrategy::AskUser => "ask a human operator to resolve".to_string(),
            RecoveryStrategy::Escalate => "escalate to reflexion".to_string(),
            RecoveryStrategy::Ignore => "proceed, failure recorded but not blocking".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crv::validators::{MonotonicPreviousStateValidator, NumericRangeValidator, SchemaShapeValidator};
    use serde_json::json;

    #[test]
    fn identical_commit_yields_identical_report() {
        let gate = CrvGate::new(
            vec![Box::new(SchemaShapeValidator::new(vec!["title".to_string()]))],
            CrvGateConfig::default(),
        );
        let commit = Commit::new(json!({"title": "Q3"}));
        let a = gate.validate(&commit);
        let b = gate.validate(&commit);
        assert_eq!(a.passed, b.passed);
        assert_eq!(a.validation_results, b.validation_results);
    }

    #[test]
    fn missing_field_blocks_with_missing_data_code() {
        let gate = CrvGate::new(
            vec![Box::new(SchemaShapeValidator::new(vec!["title".to_string()]))],
            CrvGateConfig::default(),
        );
        let commit = Commit::new(json!({"other": "x"}));
        let report = gate.validate(&commit);
        assert!(!report.passed);
        assert!(report.blocked_commit);
        assert_eq!(report.failure_code, Some(FailureCode::MissingData));
    }

    #[test]
    fn low_confidence_below_threshold_blocks() {
        let gate = CrvGate::new(
            vec![Box::new(NumericRangeValidator::new("score", 0.0, 1.0))],
            CrvGateConfig {
                required_confidence: Some(0.9),
                ..CrvGateConfig::default()
            },
        );
        let commit = Commit::new(json!({"score": 0.5}));
        let report = gate.validate(&commit);
        assert!(report.blocked_commit);
    }

    #[test]
    fn non_block_on_failure_reports_but_does_not_block() {
        let gate = CrvGate::new(
            vec![Box::new(SchemaShapeValidator::new(vec!["title".to_string()]))],
            CrvGateConfig {
                block_on_failure: false,
                ..CrvGateConfig::default()
            },
        );
        let commit = Commit::new(json!({}));
        let report = gate.validate(&commit);
        assert!(!report.passed);
        assert!(!report.blocked_commit);
        assert!(report.failure_code.is_none());
    }

    #[test]
    fn monotonic_previous_state_rejects_regression() {
        let gate = CrvGate::new(
            vec![Box::new(MonotonicPreviousStateValidator::new("counter"))],
            CrvGateConfig::default(),
        );
        let commit = Commit::new(json!({"counter": 3})).with_previous(json!({"counter": 5}));
        let report = gate.validate(&commit);
        assert!(!report.passed);
        assert_eq!(report.failure_code, Some(FailureCode::Conflict));
    }
}
