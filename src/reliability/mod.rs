//! Reliability Layer.
//!
//! Ties together the retry/backoff policy, the error classifier, the
//! degradation mode machine, and the fault injection registry into one
//! `RetryExecutor::run` entry point used by the integrated executor around
//! tool calls that come back as retryable.

pub mod classifier;
pub mod degradation;
pub mod fault_injection;
pub mod retry;

use crate::error::ReliabilityError;
use classifier::{Category, ErrorClassifier, Strategy};
use retry::RetryPolicy;
use std::future::Future;
use std::time::Instant;

/// A minimal circuit breaker: opens after `failure_threshold` consecutive
/// failures, stays open for `reset_after`, then half-opens for a single
/// trial call.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_after: std::time::Duration,
    state: parking_lot::Mutex<CircuitState>,
}

enum CircuitState {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_after: std::time::Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            reset_after,
            state: parking_lot::Mutex::new(CircuitState::Closed { consecutive_failures: 0 }),
        }
    }

    pub fn allow_call(&self) -> Result<(), ReliabilityError> {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { .. } => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() >= self.reset_after {
                    *state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(ReliabilityError::CircuitOpen(self.name.clone()))
                }
            }
        }
    }

    pub fn record_success(&self) {
        *self.state.lock() = CircuitState::Closed { consecutive_failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { consecutive_failures } => {
                let next = consecutive_failures + 1;
                if next >= self.failure_threshold {
                    *state = CircuitState::Open { opened_at: Instant::now() };
                } else {
                    *state = CircuitState::Closed { consecutive_failures: next };
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open { opened_at: Instant::now() };
            }
            CircuitState::Open { .. } => {}
        }
    }
}

/// Drives an operation through the retry policy, consulting the error
/// classifier after each failure to decide whether to retry.
pub struct RetryExecutor {
    pub policy: RetryPolicy,
    pub classifier: ErrorClassifier,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: ErrorClassifier::default(),
        }
    }

    pub async fn run<F, Fut>(&self, mut op: F) -> Result<serde_json::Value, ReliabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, String>>,
    {
        let mut rng = rand::thread_rng();
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            if started.elapsed() >= self.policy.timeout {
                break;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let classification = self.classifier.classify(&err);
                    last_error = err;

                    let non_retryable = !matches!(
                        classification.category,
                        Category::Transient | Category::Recoverable
                    ) || classification.recovery_strategy != Strategy::Retry;

                    if non_retryable {
                        return Err(ReliabilityError::Permanent(last_error));
                    }

                    if attempt == self.policy.max_attempts {
                        break;
                    }

                    let delay = self.policy.delay_for_attempt(attempt, &mut rng);
                    if started.elapsed() + delay >= self.policy.timeout {
                        break;
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(ReliabilityError::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.5,
            jitter_factor: 0.0,
            timeout: Duration::from_secs(5),
        });
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result = executor
            .run(move || {
                let calls = calls2.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("request timed out".to_string())
                    } else {
                        Ok(json!({"ok": true}))
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result = executor
            .run(move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<serde_json::Value, String>("403 forbidden".to_string())
                }
            })
            .await;

        assert!(matches!(result, Err(ReliabilityError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 1.0,
            jitter_factor: 0.0,
            timeout: Duration::from_secs(5),
        });
        let result = executor
            .run(|| async { Err::<serde_json::Value, String>("timed out".to_string()) })
            .await;
        assert!(matches!(result, Err(ReliabilityError::Exhausted { attempts: 2, .. })));
    }

    #[test]
    fn circuit_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("downstream", 3, Duration::from_secs(60));
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(matches!(breaker.allow_call(), Err(ReliabilityError::CircuitOpen(_))));
    }
}
