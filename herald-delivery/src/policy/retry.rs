//! Retry policy for activities.
//!
//! Exponential backoff: `initial * coefficient^(attempt - 1)`, capped at
//! `max_backoff_secs`, optionally jittered.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How often and how far apart a failing activity is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (in seconds).
    ///
    /// Default: 1 second
    #[serde(default = "defaults::initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    /// Multiplier applied to the delay after every failed attempt.
    ///
    /// Default: 2
    #[serde(default = "defaults::backoff_coefficient")]
    pub backoff_coefficient: u32,

    /// Upper bound for any single delay (in seconds).
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Randomizes each delay within ±`jitter_factor`.
    ///
    /// Default: 0.0 (no jitter)
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            initial_backoff_secs: defaults::initial_backoff_secs(),
            backoff_coefficient: defaults::backoff_coefficient(),
            max_backoff_secs: defaults::max_backoff_secs(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether another attempt is allowed after `attempt_count` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Returns `0` once max attempts has been reached.
    #[must_use]
    pub const fn remaining_attempts(&self, attempt_count: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt_count)
    }

    /// Delay after the 1-indexed `attempt` failed.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = u64::from(self.backoff_coefficient)
            .checked_pow(exponent)
            .map_or(self.max_backoff_secs, |multiplier| {
                self.initial_backoff_secs.saturating_mul(multiplier)
            })
            .min(self.max_backoff_secs);

        if self.jitter_factor <= 0.0 || delay == 0 {
            return Duration::from_secs(delay);
        }

        // Intentional precision loss and casting for randomization
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let jittered = {
            let delay = delay as f64 * 1000.0;
            let range = delay * self.jitter_factor;
            let jitter: f64 = rand::rng().random_range(-range..=range);
            (delay + jitter).max(0.0) as u64
        };

        Duration::from_millis(jittered)
    }
}

/// Timeouts enforced around every activity invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Longest a single invocation may run (in seconds).
    ///
    /// Default: 300 seconds
    #[serde(default = "defaults::start_to_close_secs")]
    pub start_to_close_secs: u64,

    /// Longest an invocation may go without a heartbeat (in seconds).
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_secs: defaults::start_to_close_secs(),
            heartbeat_timeout_secs: defaults::heartbeat_timeout_secs(),
        }
    }
}

impl ActivityOptions {
    #[must_use]
    pub const fn start_to_close(&self) -> Duration {
        Duration::from_secs(self.start_to_close_secs)
    }

    #[must_use]
    pub const fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn initial_backoff_secs() -> u64 {
        1
    }

    pub const fn backoff_coefficient() -> u32 {
        2
    }

    pub const fn max_backoff_secs() -> u64 {
        30
    }

    pub const fn jitter_factor() -> f64 {
        0.0
    }

    pub const fn start_to_close_secs() -> u64 {
        300 // 5 minutes
    }

    pub const fn heartbeat_timeout_secs() -> u64 {
        60
    }
}
