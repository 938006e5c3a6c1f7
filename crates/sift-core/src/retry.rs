use std::time::Duration;

/// Exponential backoff for transient upstream failures.
///
/// Delay schedule with the defaults: 500ms, 1s, 2s, 4s, ... capped at
/// `max_delay`, plus up to `jitter` of random spread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: Duration::from_millis(250),
        }
    }
}

impl BackoffConfig {
    /// No waiting at all. Handy for tests and fake upstreams.
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        std::cmp::min(delay, self.max_delay)
    }

    /// Delay before retry number `attempt`, with jitter applied.
    pub fn effective_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter.is_zero() {
            return delay;
        }
        delay + Duration::from_millis(rand_jitter_ms(self.jitter.as_millis() as u64))
    }
}

// Xorshift seeded from the clock; enough to spread retries, not for crypto.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
