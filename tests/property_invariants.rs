//! Property-based tests for invariants that hold over an unbounded input
//! space rather than a handful of fixed cases: CRV determinism, retry-delay
//! bounds, and idempotency-key stability under canonicalization.

use goalguard_kernel::crv::validators::NumericRangeValidator;
use goalguard_kernel::crv::Validator;
use goalguard_kernel::idempotency::IdempotencyKey;
use goalguard_kernel::reliability::retry::RetryPolicy;
use goalguard_kernel::types::Commit;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::time::Duration;

proptest! {
    /// P4: a validator is a pure function of its commit — the same payload
    /// always produces the same verdict and confidence.
    #[test]
    fn crv_validation_is_deterministic(x in -1000.0f64..1000.0, field_present in any::<bool>()) {
        let validator = NumericRangeValidator::new("amount", 0.0, 100.0);
        let payload = if field_present { json!({"amount": x}) } else { json!({}) };
        let commit = Commit::new(payload);

        let first = validator.validate(&commit);
        let second = validator.validate(&commit);
        prop_assert_eq!(first.valid, second.valid);
        prop_assert_eq!(first.confidence, second.confidence);
        prop_assert_eq!(first.failure_code, second.failure_code);
    }

    /// P5: for any attempt number and jitter seed, the realized delay never
    /// exceeds `max_delay` and never goes negative, and stays within the
    /// jitter envelope around the base delay.
    #[test]
    fn retry_delay_always_respects_its_bounds(
        attempt in 1u32..8,
        jitter_factor in 0.0f64..0.5,
        seed in any::<u64>(),
    ) {
        let policy = RetryPolicy {
            max_attempts: 8,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter_factor,
            timeout: Duration::from_secs(30),
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let base = policy.base_delay(attempt).as_secs_f64();
        let delay = policy.delay_for_attempt(attempt, &mut rng).as_secs_f64();

        let lower = (base * (1.0 - jitter_factor)).max(0.0);
        let upper = base * (1.0 + jitter_factor);
        prop_assert!(delay >= lower - 1e-6);
        prop_assert!(delay <= upper + 1e-6);
        prop_assert!(delay <= policy.max_delay.as_secs_f64() + 1e-9);
    }

    /// P7: reordering an object's keys, or writing an integer as its
    /// float-equivalent form, must not change the derived idempotency key.
    #[test]
    fn idempotency_key_is_stable_under_key_order_and_numeric_form(
        a in 0i64..1000,
        b in 0i64..1000,
    ) {
        let forward = json!({"a": a, "b": b});
        let reversed = json!({"b": b, "a": a});
        let key_forward = IdempotencyKey::derive("w", "t", "s", "tool", &forward);
        let key_reversed = IdempotencyKey::derive("w", "t", "s", "tool", &reversed);
        prop_assert_eq!(key_forward, key_reversed);

        let as_float = json!({"a": a as f64, "b": b as f64});
        let key_float = IdempotencyKey::derive("w", "t", "s", "tool", &as_float);
        prop_assert_eq!(key_forward, key_float);
    }
}
