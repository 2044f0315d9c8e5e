//! The queue drain procedure
//!
//! A single drain pass at a time empties the overflow queue in arrival order.
//! A pass stops at the first request that no channel can take, puts it back
//! at the head, and schedules one timer-driven retry for the earliest instant
//! a channel may become available. Passes are also triggered by every
//! enqueue, by every completed `send` while the queue is non-empty, and by
//! channel registration.

use std::{sync::atomic::Ordering, time::Duration};

use courier_common::{ChannelId, internal};

use super::{Orchestrator, send::Dispatch};

/// Floor for timer-driven retries, so an unchanged verdict never spins
const MIN_DRAIN_RETRY: Duration = Duration::from_millis(10);

impl Orchestrator {
    /// Start a drain pass in the background
    ///
    /// Does nothing outside a Tokio runtime.
    pub(super) fn trigger_drain(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            internal!(level = WARN, "No runtime available, drain not started");
            return;
        };

        let this = self.clone();
        handle.spawn(async move { this.drain().await });
    }

    /// Drain the overflow queue until it is empty or stalls
    ///
    /// Returns immediately if another pass holds the drain lock.
    pub async fn drain(&self) {
        loop {
            let Ok(guard) = self.inner.drain_lock.try_lock() else {
                return;
            };

            let stalled = self.drain_pass().await;
            drop(guard);

            // Requests queued while the lock was held found it taken, so look
            // again unless this pass stalled and already scheduled a retry.
            if stalled || self.inner.queue.is_empty() {
                return;
            }
        }
    }

    /// One pass over the queue. Returns `true` if it stopped on a request no
    /// channel could take.
    async fn drain_pass(&self) -> bool {
        while let Some(request) = self.inner.queue.dequeue() {
            if !self.any_available() {
                self.inner.queue.requeue_front(request);
                self.schedule_drain_retry();
                return true;
            }

            match self.attempt_channels(&request).await {
                Dispatch::Completed(result) => {
                    internal!(
                        level = INFO,
                        idempotency_key = request.idempotency_key(),
                        success = result.success,
                        channel = result.channel.as_ref().map(ChannelId::as_str),
                        "Dispatched queued request"
                    );
                }
                Dispatch::Unavailable => {
                    self.inner.queue.requeue_front(request);
                    self.schedule_drain_retry();
                    return true;
                }
            }
        }

        false
    }

    /// How long until some channel may accept a request, if that is known
    ///
    /// Channels with a half-open trial outstanding are ignored, since the
    /// trial's own completion triggers a drain. So are channels whose rate
    /// limit admits nothing.
    fn next_availability(&self) -> Option<Duration> {
        self.channel_ids()
            .iter()
            .filter_map(|id| {
                let circuit = self.inner.circuit_breaker.time_until_available(id)?;
                let rate = self.inner.rate_limiter.time_until_available(id)?;
                Some(circuit.max(rate))
            })
            .min()
    }

    /// Schedule a single drain retry at the next availability instant
    fn schedule_drain_retry(&self) {
        if self.inner.drain_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let Some(wait) = self.next_availability() else {
            self.inner.drain_scheduled.store(false, Ordering::Release);
            internal!(level = DEBUG, "No channel will recover on a timer, drain waits");
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.inner.drain_scheduled.store(false, Ordering::Release);
            return;
        };

        let wait = wait.max(MIN_DRAIN_RETRY);
        internal!(
            level = DEBUG,
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            queued = self.inner.queue.len(),
            "Scheduled drain retry"
        );

        let this = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(wait).await;
            this.inner.drain_scheduled.store(false, Ordering::Release);
            this.drain().await;
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use courier_common::{DeliveryRequest, DeliveryResult};

    use super::*;
    use crate::{Channel, DispatchConfig, TransportError, rate_limiter::RateLimitConfig};

    struct Idle;

    #[async_trait]
    impl Channel for Idle {
        fn id(&self) -> ChannelId {
            ChannelId::new("idle")
        }

        async fn send(&self, _: &DeliveryRequest) -> Result<DeliveryResult, TransportError> {
            Ok(DeliveryResult::delivered(self.id(), "idle-1"))
        }
    }

    fn orchestrator(max_requests: u32) -> Orchestrator {
        let config = DispatchConfig {
            rate_limit: RateLimitConfig {
                max_requests,
                window_ms: 60_000,
                ..RateLimitConfig::default()
            },
            ..DispatchConfig::default()
        };
        Orchestrator::with_channels(config, [Arc::new(Idle) as Arc<dyn Channel>]).unwrap()
    }

    #[test]
    fn test_closed_channel_with_capacity_is_available_now() {
        assert_eq!(orchestrator(1).next_availability(), Some(Duration::ZERO));
    }

    #[test]
    fn test_exhausted_window_reports_its_wait() {
        let orchestrator = orchestrator(1);
        assert!(orchestrator.admit(&ChannelId::new("idle")));

        let wait = orchestrator.next_availability().unwrap();
        assert!(wait > Duration::ZERO && wait <= Duration::from_millis(60_000));
    }

    #[tokio::test]
    async fn test_zero_rate_limit_never_schedules_a_retry() {
        let orchestrator = orchestrator(0);
        assert_eq!(orchestrator.next_availability(), None);

        let result = orchestrator
            .send(DeliveryRequest::new("user@example.com", "held", "body"))
            .await;
        assert!(!result.success);
        assert_eq!(orchestrator.queue_len(), 1);

        orchestrator.drain().await;
        assert_eq!(orchestrator.queue_len(), 1);
        assert!(!orchestrator.inner.drain_scheduled.load(Ordering::Acquire));
    }
}
