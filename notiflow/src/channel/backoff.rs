//! Reconnect backoff for the push transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capped exponential backoff with optional jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for the delay in milliseconds (before jitter).
    pub max_delay_ms: u64,
    /// Multiplier applied per failed attempt.
    pub multiplier: f64,
    /// Whether to add up to 25% random jitter.
    pub use_jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Delay before reconnect attempt `attempt` (1-based). Attempt 0 is immediate.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let delay_ms = base_delay.min(self.max_delay_ms as f64) as u64;

        let final_delay = if self.use_jitter {
            let jitter = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay_ms + jitter
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }
}
