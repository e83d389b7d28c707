//! `KernelConfig`: the deployment-tunable parameters for every gate.
//!
//! Retry multipliers, approval TTLs, effort weights, degradation
//! thresholds, and reflexion attempt bounds are collected into one
//! `serde`-serializable struct with sane defaults, loadable from a TOML
//! file via `toml`.

use crate::effort::{EffortThresholds, EffortWeights, MetricBaselines};
use crate::reflexion::ReflexionConfig;
use crate::reliability::degradation::{DegradationController, ModeThresholds};
use crate::reliability::retry::RetryPolicy;
use crate::types::ResourceCaps;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

/// Wire-friendly mirror of [`RetryPolicy`] — `Duration` has no stable TOML
/// representation, so delays round-trip as milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_factor: f64,
    pub timeout_ms: u64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            multiplier: defaults.multiplier,
            jitter_factor: defaults.jitter_factor,
            timeout_ms: defaults.timeout.as_millis() as u64,
        }
    }
}

impl From<RetryPolicyConfig> for RetryPolicy {
    fn from(cfg: RetryPolicyConfig) -> Self {
        RetryPolicy {
            max_attempts: cfg.max_attempts,
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            multiplier: cfg.multiplier,
            jitter_factor: cfg.jitter_factor,
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationThresholds {
    /// Healthy-fraction floor for `Mode::Full`.
    pub full_at_or_above: f64,
    /// Healthy-fraction floor for `Mode::Partial`.
    pub partial_at_or_above: f64,
    /// Healthy-fraction floor for `Mode::Minimal`; below this is `Emergency`.
    pub minimal_at_or_above: f64,
}

impl Default for DegradationThresholds {
    fn default() -> Self {
        Self {
            full_at_or_above: 0.90,
            partial_at_or_above: 0.70,
            minimal_at_or_above: 0.40,
        }
    }
}

impl From<DegradationThresholds> for ModeThresholds {
    fn from(cfg: DegradationThresholds) -> Self {
        ModeThresholds {
            full_at_or_above: cfg.full_at_or_above,
            partial_at_or_above: cfg.partial_at_or_above,
            minimal_at_or_above: cfg.minimal_at_or_above,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub resource_caps: ResourceCaps,
    pub retry_policy: RetryPolicyConfig,
    pub approval_token_ttl_secs: u64,
    pub effort_weights: EffortWeights,
    pub effort_thresholds: EffortThresholds,
    pub effort_baselines: MetricBaselines,
    pub degradation_thresholds: DegradationThresholds,
    pub max_fix_attempts: u32,
    pub reflexion_min_confidence: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            resource_caps: ResourceCaps::default(),
            retry_policy: RetryPolicyConfig::default(),
            approval_token_ttl_secs: crate::policy::token::ApprovalToken::DEFAULT_TTL_SECS,
            effort_weights: EffortWeights::default(),
            effort_thresholds: EffortThresholds::default(),
            effort_baselines: MetricBaselines::default(),
            degradation_thresholds: DegradationThresholds::default(),
            max_fix_attempts: ReflexionConfig::default().max_fix_attempts,
            reflexion_min_confidence: ReflexionConfig::default().min_confidence,
        }
    }
}

impl KernelConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.into()
    }

    pub fn reflexion_config(&self) -> ReflexionConfig {
        ReflexionConfig {
            max_fix_attempts: self.max_fix_attempts,
            min_confidence: self.reflexion_min_confidence,
            ..ReflexionConfig::default()
        }
    }

    pub fn degradation_controller(&self) -> DegradationController {
        DegradationController::with_thresholds(self.degradation_thresholds.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = KernelConfig::default();
        let serialized = toml::to_string(&config).expect("default config serializes");
        let parsed = KernelConfig::from_toml_str(&serialized).expect("serialized config parses");
        assert_eq!(parsed.approval_token_ttl_secs, config.approval_token_ttl_secs);
        assert_eq!(parsed.max_fix_attempts, config.max_fix_attempts);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let parsed = KernelConfig::from_toml_str("approval_token_ttl_secs = 120\n").unwrap();
        assert_eq!(parsed.approval_token_ttl_secs, 120);
        assert_eq!(parsed.retry_policy.max_attempts, RetryPolicyConfig::default().max_attempts);
    }

    #[test]
    fn missing_file_reports_a_read_error() {
        let err = KernelConfig::from_toml_file("/nonexistent/kernel.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn degradation_controller_honors_custom_thresholds() {
        let mut config = KernelConfig::default();
        config.degradation_thresholds.full_at_or_above = 0.5;
        let controller = config.degradation_controller();
        controller.health().report("svc-a", true);
        controller.health().report("svc-b", false);
        // 50% healthy now clears the lowered Full floor.
        assert_eq!(controller.recompute_mode(), crate::reliability::degradation::Mode::Full);
    }

    #[test]
    fn retry_policy_config_converts_millisecond_fields_into_durations() {
        let cfg = RetryPolicyConfig {
            max_attempts: 4,
            initial_delay_ms: 50,
            max_delay_ms: 2_000,
            multiplier: 1.5,
            jitter_factor: 0.2,
            timeout_ms: 5_000,
        };
        let policy: RetryPolicy = cfg.into();
        assert_eq!(policy.initial_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_millis(2_000));
        assert_eq!(policy.timeout, Duration::from_millis(5_000));
    }
}
