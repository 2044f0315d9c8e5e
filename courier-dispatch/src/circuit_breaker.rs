//! Per-channel circuit breaker to stop hammering a failing channel
//!
//! # Circuit Breaker Pattern
//!
//! The circuit breaker has three states:
//! - **Closed**: Normal operation, all requests allowed
//! - **Open**: Circuit tripped, requests rejected until the recovery timer elapses
//! - **Half-Open**: Exactly one trial request allowed to probe channel health
//!
//! # State Transitions
//!
//! ```text
//! ┌─────────┐  failure_count >= threshold   ┌──────┐
//! │ Closed  │ ──────────────────────────>   │ Open │ <──────┐
//! └─────────┘                               └──────┘        │
//!     ^                                        │            │
//!     │                                        │ recovery   │ Failure
//!     │                                        v elapsed    │
//!     │  Success              ┌───────────────┐             │
//!     └───────────────────────│  Half-Open    │─────────────┘
//!                             └───────────────┘
//! ```
//!
//! The failure count is only reset by a recorded success, so a failed
//! half-open trial immediately reopens the circuit. The recovery timer is
//! measured from the most recent failure.
//!
//! # Example
//!
//! ```text
//! Threshold: 5 failures
//! Recovery: 10 seconds
//!
//! t=0s:    Closed (normal)
//! t=2s:    5th consecutive failure → Open
//! t=2-12s: channel skipped, no requests sent
//! t=12s:   next check → Half-Open, one trial request allowed
//! t=12.3s: trial succeeds → Closed
//! ```

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use courier_common::{ChannelId, tracing};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures (without an intervening success) that opens the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open after the last failure (milliseconds)
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Per-channel circuit breaker overrides
    #[serde(default)]
    pub channel_overrides: ahash::AHashMap<String, ChannelCircuitBreakerConfig>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            channel_overrides: ahash::AHashMap::default(),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_recovery_timeout_ms() -> u64 {
    10_000
}

/// Per-channel circuit breaker configuration override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all requests allowed
    Closed,
    /// Circuit tripped - reject requests until recovery elapses
    Open,
    /// Testing recovery - a single trial request allowed
    HalfOpen,
}

/// Per-channel circuit breaker state
#[derive(Debug)]
struct CircuitBreakerData {
    state: CircuitState,
    /// Failures since the last recorded success
    failure_count: u32,
    last_failure_at: Option<Instant>,
    /// Whether the half-open trial has been handed out
    trial_in_flight: bool,
    config: ChannelCircuitBreakerConfig,
}

impl CircuitBreakerData {
    const fn new(config: ChannelCircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            trial_in_flight: false,
            config,
        }
    }

    const fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.config.recovery_timeout_ms)
    }

    fn is_recovery_elapsed(&self) -> bool {
        self.last_failure_at
            .is_none_or(|last_failure| last_failure.elapsed() >= self.recovery_timeout())
    }

    /// Read-only: would `can_request` currently say yes?
    fn is_available(&self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.is_recovery_elapsed(),
            CircuitState::HalfOpen => !self.trial_in_flight,
        }
    }

    fn can_request(&mut self, channel: &ChannelId) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.is_recovery_elapsed() {
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    tracing::info!(
                        channel = %channel,
                        "Circuit breaker entering HALF-OPEN state - allowing trial request"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    false
                } else {
                    self.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Returns `true` if the circuit was not already closed
    fn record_success(&mut self, channel: &ChannelId) -> bool {
        let recovered = self.state != CircuitState::Closed;

        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.last_failure_at = None;
        self.trial_in_flight = false;

        if recovered {
            tracing::info!(
                channel = %channel,
                "Circuit breaker CLOSED - normal operation resumed"
            );
        }

        recovered
    }

    /// Returns `true` if the circuit transitioned to Open
    fn record_failure(&mut self, channel: &ChannelId) -> bool {
        if self.state == CircuitState::Open {
            return false;
        }

        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_at = Some(Instant::now());
        self.trial_in_flight = false;

        if self.failure_count < self.config.failure_threshold {
            return false;
        }

        if self.state == CircuitState::HalfOpen {
            tracing::warn!(
                channel = %channel,
                "Circuit breaker trial failed - reopening circuit"
            );
        } else {
            tracing::warn!(
                channel = %channel,
                failure_count = self.failure_count,
                threshold = self.config.failure_threshold,
                recovery_timeout_ms = self.config.recovery_timeout_ms,
                "Circuit breaker OPENED - skipping channel until recovery"
            );
        }
        self.state = CircuitState::Open;

        true
    }

    /// How long until `can_request` may return `true`.
    ///
    /// `None` while a half-open trial is outstanding, since only its outcome
    /// can change the answer.
    fn time_until_available(&self) -> Option<Duration> {
        match self.state {
            CircuitState::Closed => Some(Duration::ZERO),
            CircuitState::HalfOpen if self.trial_in_flight => None,
            CircuitState::HalfOpen => Some(Duration::ZERO),
            CircuitState::Open => Some(self.last_failure_at.map_or(Duration::ZERO, |last| {
                self.recovery_timeout().saturating_sub(last.elapsed())
            })),
        }
    }
}

/// Per-channel circuit breaker manager
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    breakers: DashMap<ChannelId, Arc<parking_lot::Mutex<CircuitBreakerData>>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    fn channel_config(&self, channel: &ChannelId) -> ChannelCircuitBreakerConfig {
        self.config
            .channel_overrides
            .get(channel.as_str())
            .cloned()
            .unwrap_or(ChannelCircuitBreakerConfig {
                failure_threshold: self.config.failure_threshold,
                recovery_timeout_ms: self.config.recovery_timeout_ms,
            })
    }

    /// Install a fresh, closed breaker for a channel
    pub fn register(&self, channel: &ChannelId) {
        let data = CircuitBreakerData::new(self.channel_config(channel));
        self.breakers
            .insert(channel.clone(), Arc::new(parking_lot::Mutex::new(data)));
    }

    fn get_breaker(&self, channel: &ChannelId) -> Arc<parking_lot::Mutex<CircuitBreakerData>> {
        self.breakers
            .entry(channel.clone())
            .or_insert_with(|| {
                Arc::new(parking_lot::Mutex::new(CircuitBreakerData::new(
                    self.channel_config(channel),
                )))
            })
            .clone()
    }

    /// Check, without changing any state, whether the channel would accept a request
    pub fn is_available(&self, channel: &ChannelId) -> bool {
        self.get_breaker(channel).lock().is_available()
    }

    /// Ask to send a request through the channel
    ///
    /// Returns `false` if the circuit is open, or if it is half-open and the
    /// single trial has already been handed out. May move Open → Half-Open.
    pub fn can_request(&self, channel: &ChannelId) -> bool {
        self.get_breaker(channel).lock().can_request(channel)
    }

    /// Record a successful request
    ///
    /// Returns `true` if the circuit recovered (was not already closed)
    pub fn record_success(&self, channel: &ChannelId) -> bool {
        self.get_breaker(channel).lock().record_success(channel)
    }

    /// Record a failed request
    ///
    /// Returns `true` if the circuit transitioned to Open
    pub fn record_failure(&self, channel: &ChannelId) -> bool {
        self.get_breaker(channel).lock().record_failure(channel)
    }

    pub fn get_state(&self, channel: &ChannelId) -> CircuitState {
        self.get_breaker(channel).lock().state
    }

    /// See [`CircuitBreakerData::time_until_available`]
    pub fn time_until_available(&self, channel: &ChannelId) -> Option<Duration> {
        self.get_breaker(channel).lock().time_until_available()
    }

    pub fn get_stats(&self, channel: &ChannelId) -> CircuitBreakerStats {
        let breaker = self.get_breaker(channel);
        let breaker = breaker.lock();
        CircuitBreakerStats {
            state: breaker.state,
            failure_count: breaker.failure_count,
            failure_threshold: breaker.config.failure_threshold,
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    /// Failures since the last recorded success
    pub failure_count: u32,
    pub failure_threshold: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, recovery_timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout_ms,
            channel_overrides: ahash::AHashMap::default(),
        }
    }

    #[test]
    fn test_circuit_breaker_closed_to_open() {
        let breaker = CircuitBreaker::new(config(3, 5_000));
        let channel = ChannelId::new("channel-a");

        assert_eq!(breaker.get_state(&channel), CircuitState::Closed);
        assert!(breaker.can_request(&channel));

        assert!(!breaker.record_failure(&channel));
        assert_eq!(breaker.get_state(&channel), CircuitState::Closed);
        assert!(breaker.can_request(&channel));

        assert!(!breaker.record_failure(&channel));
        assert_eq!(breaker.get_state(&channel), CircuitState::Closed);

        // Third failure trips the circuit
        assert!(breaker.record_failure(&channel));
        assert_eq!(breaker.get_state(&channel), CircuitState::Open);
        assert!(!breaker.can_request(&channel));
        assert!(!breaker.is_available(&channel));
    }

    #[test]
    fn test_circuit_breaker_half_open_success() {
        let breaker = CircuitBreaker::new(config(2, 0));
        let channel = ChannelId::new("channel-a");

        breaker.record_failure(&channel);
        breaker.record_failure(&channel);
        assert_eq!(breaker.get_state(&channel), CircuitState::Open);

        // Recovery of 0ms elapses immediately
        assert!(breaker.can_request(&channel));
        assert_eq!(breaker.get_state(&channel), CircuitState::HalfOpen);

        assert!(breaker.record_success(&channel));
        assert_eq!(breaker.get_state(&channel), CircuitState::Closed);
        assert_eq!(breaker.get_stats(&channel).failure_count, 0);
    }

    #[test]
    fn test_circuit_breaker_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config(2, 0));
        let channel = ChannelId::new("channel-a");

        breaker.record_failure(&channel);
        breaker.record_failure(&channel);
        assert!(breaker.can_request(&channel));
        assert_eq!(breaker.get_state(&channel), CircuitState::HalfOpen);

        assert!(breaker.record_failure(&channel));
        assert_eq!(breaker.get_state(&channel), CircuitState::Open);
    }

    #[test]
    fn test_half_open_allows_exactly_one_trial() {
        let breaker = CircuitBreaker::new(config(1, 0));
        let channel = ChannelId::new("channel-a");

        breaker.record_failure(&channel);
        assert!(breaker.can_request(&channel));
        assert!(!breaker.can_request(&channel));
        assert!(!breaker.is_available(&channel));
        assert_eq!(breaker.time_until_available(&channel), None);
    }

    #[test]
    fn test_is_available_does_not_consume_trial() {
        let breaker = CircuitBreaker::new(config(1, 0));
        let channel = ChannelId::new("channel-a");

        breaker.record_failure(&channel);
        assert!(breaker.is_available(&channel));
        assert!(breaker.is_available(&channel));
        assert_eq!(breaker.get_state(&channel), CircuitState::Open);

        assert!(breaker.can_request(&channel));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Time-based test not compatible with Miri")]
    fn test_recovers_after_timeout() {
        let breaker = CircuitBreaker::new(config(1, 50));
        let channel = ChannelId::new("channel-a");

        breaker.record_failure(&channel);
        assert!(!breaker.can_request(&channel));
        let wait = breaker.time_until_available(&channel).unwrap_or_default();
        assert!(wait > Duration::ZERO && wait <= Duration::from_millis(50));

        std::thread::sleep(Duration::from_millis(60));

        assert!(breaker.can_request(&channel));
        assert!(!breaker.can_request(&channel));
    }

    #[test]
    fn test_failure_while_open_is_ignored() {
        let breaker = CircuitBreaker::new(config(1, 60_000));
        let channel = ChannelId::new("channel-a");

        assert!(breaker.record_failure(&channel));
        assert!(!breaker.record_failure(&channel));
        assert_eq!(breaker.get_stats(&channel).failure_count, 1);
    }

    #[test]
    fn test_circuit_breaker_success_resets_failures() {
        let breaker = CircuitBreaker::new(config(3, 5_000));
        let channel = ChannelId::new("channel-a");

        breaker.record_failure(&channel);
        breaker.record_failure(&channel);

        assert!(!breaker.record_success(&channel));

        breaker.record_failure(&channel);
        breaker.record_failure(&channel);
        assert_eq!(breaker.get_state(&channel), CircuitState::Closed);
    }

    #[test]
    fn test_register_resets_state() {
        let breaker = CircuitBreaker::new(config(1, 60_000));
        let channel = ChannelId::new("channel-a");

        breaker.record_failure(&channel);
        assert_eq!(breaker.get_state(&channel), CircuitState::Open);

        breaker.register(&channel);
        assert_eq!(breaker.get_state(&channel), CircuitState::Closed);
    }

    #[test]
    fn test_channel_override() {
        let mut cfg = config(5, 60_000);
        cfg.channel_overrides.insert(
            "fragile".to_string(),
            ChannelCircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout_ms: 60_000,
            },
        );
        let breaker = CircuitBreaker::new(cfg);
        let fragile = ChannelId::new("fragile");
        let sturdy = ChannelId::new("sturdy");

        assert!(breaker.record_failure(&fragile));
        assert!(!breaker.record_failure(&sturdy));
        assert_eq!(breaker.get_stats(&fragile).failure_threshold, 1);
        assert_eq!(breaker.get_stats(&sturdy).failure_threshold, 5);
    }

    #[test]
    fn test_circuit_breaker_stats() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
        let channel = ChannelId::new("channel-a");

        let stats = breaker.get_stats(&channel);
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);

        breaker.record_failure(&channel);
        breaker.record_failure(&channel);

        assert_eq!(breaker.get_stats(&channel).failure_count, 2);
    }
}
