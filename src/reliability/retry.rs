//! Retry policy and backoff-with-jitter.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// `base_n = min(initial * multiplier^(n-1), max_delay)` for 1-indexed
    /// attempt `n`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// `jitter = uniform(-1,1) * jitter_factor * base`, `delay = max(0, floor(base + jitter))`.
    ///
    /// `floor` is applied in milliseconds, not seconds — flooring whole
    /// seconds would zero out any sub-second base delay (the common case,
    /// since `initial_delay` defaults to 100ms).
    pub fn delay_for_attempt(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base_ms = self.base_delay(attempt).as_secs_f64() * 1000.0;
        let jitter_sign: f64 = rng.gen_range(-1.0..=1.0);
        let jitter_ms = jitter_sign * self.jitter_factor * base_ms;
        let delay_ms = (base_ms + jitter_ms).max(0.0).floor();
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn base_delay_respects_multiplier_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.0,
            timeout: Duration::from_secs(10),
        };
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(400));
        // Capped at max_delay regardless of further growth.
        assert_eq!(policy.base_delay(10), Duration::from_secs(1));
    }

    #[test]
    fn jittered_delay_stays_within_bounds_p5() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.2,
            timeout: Duration::from_secs(10),
        };
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 1..=5 {
            let base = policy.base_delay(attempt).as_secs_f64();
            let lower = (base * (1.0 - policy.jitter_factor)).max(0.0);
            let upper = base * (1.0 + policy.jitter_factor);
            let delay = policy.delay_for_attempt(attempt, &mut rng).as_secs_f64();
            assert!(delay >= lower - 1e-9 && delay <= upper + 1e-9, "delay {delay} not in [{lower}, {upper}]");
            assert!(delay <= policy.max_delay.as_secs_f64());
        }
    }
}
