//! Exponential backoff with jitter

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Largest extra delay, as a fraction of the exponential component
const MAX_JITTER_FACTOR: f64 = 0.5;

/// Delay between attempts on the same channel.
///
/// # Formula
/// `exp = min(max_delay, base * 2^(attempt - 1))`, then
/// `delay = exp + uniform(0, exp * jitter_factor)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry (milliseconds).
    ///
    /// Default: 100
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on the exponential component (milliseconds).
    ///
    /// Default: 5000
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound of the random extra delay, as a fraction of the
    /// exponential component. Clamped to `[0.0, 0.5]`.
    ///
    /// Default: 0.5
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl BackoffPolicy {
    /// The deterministic part of the delay for a 1-indexed attempt
    #[must_use]
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = if exponent >= 63 {
            self.max_delay_ms
        } else {
            self.base_delay_ms
                .saturating_mul(1u64 << exponent)
                .min(self.max_delay_ms)
        };

        Duration::from_millis(delay)
    }

    /// The jittered delay to wait after the given 1-indexed attempt failed
    ///
    /// Always within `[exp, exp * 1.5]`, whatever `jitter_factor` is set to.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self.exponential_delay(attempt);
        let jitter_factor = self.effective_jitter_factor();

        #[allow(clippy::cast_precision_loss)]
        let range = exponential.as_millis() as f64 * jitter_factor;
        if range <= 0.0 {
            return exponential;
        }

        let jitter: f64 = rand::rng().random_range(0.0..=range);
        Duration::try_from_secs_f64(jitter / 1000.0)
            .map_or(exponential, |jitter| exponential.saturating_add(jitter))
    }

    /// `jitter_factor` within `[0.0, 0.5]`; NaN counts as no jitter
    fn effective_jitter_factor(&self) -> f64 {
        if self.jitter_factor.is_nan() {
            0.0
        } else {
            self.jitter_factor.clamp(0.0, MAX_JITTER_FACTOR)
        }
    }
}

mod defaults {
    pub const fn base_delay_ms() -> u64 {
        100
    }

    pub const fn max_delay_ms() -> u64 {
        5000
    }

    pub const fn jitter_factor() -> f64 {
        0.5
    }
}
