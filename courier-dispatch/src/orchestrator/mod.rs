//! The dispatch orchestrator
//!
//! Composes idempotency, per-channel availability gating, ordered failover,
//! bounded retry with backoff, attempt history and overflow queuing into the
//! single [`Orchestrator::send`] operation.

mod drain;
mod send;

use std::{
    fmt,
    sync::{Arc, atomic::AtomicBool},
};

use courier_common::{AttemptRecord, ChannelId, internal};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    Channel, RegistrationError,
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats},
    idempotency::{IdempotencyConfig, IdempotencyGuard},
    policy::RetryPolicy,
    queue::OverflowQueue,
    rate_limiter::{RateLimitConfig, RateLimitStats, RateLimiter},
    status::StatusTracker,
};

/// Dispatch configuration
///
/// Every field has a default, so an empty RON struct `()` is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Attempts per channel and the backoff between them
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-channel sliding-window rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Per-channel circuit breaker
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Idempotency-key retention
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
}

/// Point-in-time view of one channel's gating state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub circuit: CircuitBreakerStats,
    pub rate_limit: RateLimitStats,
}

type Registered = (ChannelId, Arc<dyn Channel>);

struct Inner {
    /// Channels in priority order
    channels: RwLock<Vec<Registered>>,
    retry: RetryPolicy,
    circuit_breaker: CircuitBreaker,
    rate_limiter: RateLimiter,
    idempotency: IdempotencyGuard,
    status: StatusTracker,
    queue: OverflowQueue,
    /// Held for the duration of a drain pass
    drain_lock: tokio::sync::Mutex<()>,
    /// Set while a timer-driven drain retry is pending
    drain_scheduled: AtomicBool,
}

/// Dispatches requests through an ordered list of channels
///
/// Cloning yields another handle to the same orchestrator; all state is
/// shared and safe to use from concurrent tasks.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("channels", &self.channel_ids())
            .field("retry", &self.inner.retry)
            .field("queued", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with no channels
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: RwLock::new(Vec::new()),
                retry: config.retry,
                circuit_breaker: CircuitBreaker::new(config.circuit_breaker),
                rate_limiter: RateLimiter::new(config.rate_limit),
                idempotency: IdempotencyGuard::new(&config.idempotency),
                status: StatusTracker::new(),
                queue: OverflowQueue::new(),
                drain_lock: tokio::sync::Mutex::new(()),
                drain_scheduled: AtomicBool::new(false),
            }),
        }
    }

    /// Create an orchestrator and register `channels` in priority order
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] if two channels share an id, or a
    /// channel uses the reserved `all` id.
    pub fn with_channels(
        config: DispatchConfig,
        channels: impl IntoIterator<Item = Arc<dyn Channel>>,
    ) -> Result<Self, RegistrationError> {
        let orchestrator = Self::new(config);
        for channel in channels {
            orchestrator.add_channel(channel)?;
        }
        Ok(orchestrator)
    }

    /// Append a channel to the end of the priority order
    ///
    /// The channel starts with a closed circuit breaker and an empty
    /// rate-limit window. May be called while requests are in flight; sends
    /// already iterating keep the channel list they started with.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::DuplicateChannel`] if a channel with the
    /// same id is registered, or [`RegistrationError::ReservedId`] for `all`.
    pub fn add_channel(&self, channel: Arc<dyn Channel>) -> Result<(), RegistrationError> {
        let id = channel.id();
        if id.is_all() {
            return Err(RegistrationError::ReservedId(id));
        }

        let mut channels = self.inner.channels.write();
        if channels.iter().any(|(existing, _)| *existing == id) {
            return Err(RegistrationError::DuplicateChannel(id));
        }

        self.inner.circuit_breaker.register(&id);
        self.inner.rate_limiter.register(&id);
        channels.push((id.clone(), channel));
        drop(channels);

        internal!(level = INFO, channel = %id, "Registered channel");

        if !self.inner.queue.is_empty() {
            self.trigger_drain();
        }

        Ok(())
    }

    /// Snapshot of the channel list, so iteration never holds the lock
    fn registered(&self) -> Vec<Registered> {
        self.inner.channels.read().clone()
    }

    /// Registered channel ids in priority order
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.inner
            .channels
            .read()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.channels.read().len()
    }

    /// Gating state of every channel, in priority order
    pub fn channel_snapshots(&self) -> Vec<ChannelSnapshot> {
        self.channel_ids()
            .into_iter()
            .map(|id| ChannelSnapshot {
                circuit: self.inner.circuit_breaker.get_stats(&id),
                rate_limit: self.inner.rate_limiter.get_stats(&id),
                id,
            })
            .collect()
    }

    /// Attempt history for a request id, oldest first
    pub fn history(&self, request_id: &str) -> Vec<AttemptRecord> {
        self.inner.status.history(request_id)
    }

    pub fn latest(&self, request_id: &str) -> Option<AttemptRecord> {
        self.inner.status.latest(request_id)
    }

    /// Requests waiting in the overflow queue
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.inner.circuit_breaker
    }

    /// Read-only availability probe: could the channel take a request now?
    fn is_available(&self, id: &ChannelId) -> bool {
        self.inner.circuit_breaker.is_available(id) && self.inner.rate_limiter.has_capacity(id)
    }

    /// Whether any registered channel could take a request now
    fn any_available(&self) -> bool {
        self.inner
            .channels
            .read()
            .iter()
            .any(|(id, _)| self.is_available(id))
    }

    /// Consume admission for one visit to a channel
    ///
    /// The breaker is peeked before the rate limiter is charged so an open
    /// circuit never burns a rate-limit slot, and the half-open trial is only
    /// taken once the rate limiter has admitted the request. A slot taken for
    /// a trial lost to a concurrent request is handed back.
    fn admit(&self, id: &ChannelId) -> bool {
        if !self.inner.circuit_breaker.is_available(id) {
            internal!(level = WARN, channel = %id, "Circuit open, skipping channel");
            return false;
        }

        if !self.inner.rate_limiter.is_allowed(id) {
            internal!(level = WARN, channel = %id, "Rate limit exceeded, skipping channel");
            return false;
        }

        if !self.inner.circuit_breaker.can_request(id) {
            self.inner.rate_limiter.release(id);
            internal!(level = WARN, channel = %id, "Circuit open, skipping channel");
            return false;
        }

        true
    }
}
