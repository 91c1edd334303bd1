//! Deterministic exponential backoff with optional jitter.
//!
//! There is no maximum elapsed time: callers decide when to stop.

use std::time::Duration;

use beacon_core::config::BackoffConfig;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    jitter: f64,
    current: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            multiplier,
            max,
            jitter: 0.0,
            current: initial,
            attempt: 0,
        }
    }

    /// Randomize each delay by up to `fraction` of its value, in either direction.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 0.99);
        self
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_interval_ms),
            config.multiplier,
            Duration::from_millis(config.max_interval_ms),
        )
        .with_jitter(config.jitter)
    }

    /// Delay before the next attempt. Advances the interval for the one after.
    pub fn next_backoff(&mut self) -> Duration {
        let value = self.current;
        self.attempt = self.attempt.saturating_add(1);
        self.current = self.grow(self.current);
        self.randomize(value)
    }

    /// Number of delays handed out since creation or the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Interval the next call to [`ExponentialBackoff::next_backoff`] is based on.
    pub fn current_interval(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempt = 0;
    }

    fn grow(&self, interval: Duration) -> Duration {
        if interval.as_secs_f64() >= self.max.as_secs_f64() / self.multiplier {
            return self.max;
        }
        interval.mul_f64(self.multiplier).min(self.max)
    }

    fn randomize(&self, interval: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return interval;
        }
        let delta = interval.as_secs_f64() * self.jitter;
        let offset = rand::thread_rng().gen_range(-delta..=delta);
        Duration::from_secs_f64((interval.as_secs_f64() + offset).max(0.0))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
