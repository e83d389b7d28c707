//! Effort Evaluator.
//!
//! Produces an *advisory* score; the Policy Gate remains the sole binding
//! authority. Weighted terms are pulled out of a config struct, clamped to
//! `[0,1]`, and combined.

use crate::types::RiskTier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EffortWeights {
    pub cost: f64,
    pub risk: f64,
    pub value: f64,
    pub time: f64,
}

impl Default for EffortWeights {
    fn default() -> Self {
        Self {
            cost: 0.25,
            risk: 0.35,
            value: 0.25,
            time: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EffortThresholds {
    pub approve_at_or_above: f64,
    pub reject_below: f64,
}

impl Default for EffortThresholds {
    fn default() -> Self {
        Self {
            approve_at_or_above: 0.6,
            reject_below: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Approve,
    Review,
    Reject,
}

/// Observability baselines used to normalize `ObservedMetrics` into `[0,1]`
/// scores (lower-is-better metrics, so the normalized score is inverted).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricBaselines {
    pub cost_per_success: f64,
    pub mttr_secs: f64,
    pub human_escalation_rate: f64,
}

impl Default for MetricBaselines {
    fn default() -> Self {
        Self {
            cost_per_success: 1.0,
            mttr_secs: 300.0,
            human_escalation_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObservedMetrics {
    pub cost_per_success: f64,
    pub mttr_secs: f64,
    pub human_escalation_rate: f64,
}

fn base_risk_score(tier: RiskTier) -> f64 {
    match tier {
        RiskTier::Low => 0.9,
        RiskTier::Medium => 0.6,
        RiskTier::High => 0.3,
        RiskTier::Critical => 0.1,
    }
}

/// Normalizes an observed metric against its baseline: `1.0` when the
/// observation matches the baseline exactly, decaying toward `0.0` as the
/// observation grows past it (lower is better for all three tracked
/// metrics).
fn normalize_against_baseline(observed: f64, baseline: f64) -> f64 {
    if baseline <= 0.0 {
        return 1.0;
    }
    (1.0 - (observed / baseline - 1.0).max(0.0)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct EffortReport {
    pub cost: f64,
    pub risk: f64,
    pub value: f64,
    pub time: f64,
    pub decision_score: f64,
    pub recommendation: Recommendation,
}

pub struct EffortEvaluator {
    pub weights: EffortWeights,
    pub thresholds: EffortThresholds,
    pub baselines: MetricBaselines,
}

impl Default for EffortEvaluator {
    fn default() -> Self {
        Self {
            weights: EffortWeights::default(),
            thresholds: EffortThresholds::default(),
            baselines: MetricBaselines::default(),
        }
    }
}

impl EffortEvaluator {
    /// `world_model_value_score` is the weighted average of external
    /// soft-constraint category scores; this evaluator treats it as an
    /// opaque `[0,1]` input supplied by the caller since those constraints
    /// live outside the kernel's scope.
    pub fn evaluate(
        &self,
        risk_tier: RiskTier,
        metrics: ObservedMetrics,
        world_model_value_score: f64,
    ) -> EffortReport {
        let cost = normalize_against_baseline(metrics.cost_per_success, self.baselines.cost_per_success);
        let time = normalize_against_baseline(metrics.mttr_secs, self.baselines.mttr_secs);
        let escalation_penalty =
            normalize_against_baseline(metrics.human_escalation_rate, self.baselines.human_escalation_rate);
        let risk = (base_risk_score(risk_tier) * 0.7 + escalation_penalty * 0.3).clamp(0.0, 1.0);
        let value = world_model_value_score.clamp(0.0, 1.0);

        let decision_score = (self.weights.cost * cost
            + self.weights.risk * risk
            + self.weights.value * value
            + self.weights.time * time)
            .clamp(0.0, 1.0);

        let recommendation = if decision_score >= self.thresholds.approve_at_or_above {
            Recommendation::Approve
        } else if decision_score < self.thresholds.reject_below {
            Recommendation::Reject
        } else {
            Recommendation::Review
        };

        EffortReport {
            cost,
            risk,
            value,
            time,
            decision_score,
            recommendation,
        }
    }
}
