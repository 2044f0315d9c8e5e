//! Per-channel retry budget

use serde::{Deserialize, Serialize};

use super::BackoffPolicy;

/// How often a single channel is tried before failing over.
///
/// A channel gets `max_retries + 1` attempts per visit; [`BackoffPolicy`]
/// spaces them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt on each channel.
    ///
    /// Default: 2
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Attempts a channel gets per visit
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt may follow the given 1-indexed attempt
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.total_attempts()
    }
}

mod defaults {
    pub const fn max_retries() -> u32 {
        2
    }
}
