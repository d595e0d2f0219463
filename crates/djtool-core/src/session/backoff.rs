//! Exponential reconnection backoff.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Delay schedule for reconnection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self { base, multiplier, max_delay }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.base.as_millis() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= cap {
            return self.max_delay;
        }
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(config.base(), config.multiplier, config.max_delay())
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}
