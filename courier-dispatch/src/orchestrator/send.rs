//! The `send` operation: idempotency gate, availability scan, failover and
//! the per-channel retry loop

use courier_common::{
    AttemptRecord, ChannelId, DeliveryRequest, DeliveryResult, internal, outgoing, tracing,
};

use super::Orchestrator;
use crate::{Channel, CircuitState, DispatchError};

/// History key for requests with neither an idempotency key nor a message id
const UNKNOWN_REQUEST: &str = "unknown";

/// How a pass over the channel list ended
#[derive(Debug)]
pub(super) enum Dispatch {
    /// A channel delivered, or every admitted channel was exhausted
    Completed(DeliveryResult),
    /// No channel admitted the request, so nothing was attempted
    Unavailable,
}

impl Orchestrator {
    /// Dispatch a request
    ///
    /// Never fails: every outcome, including duplicates, queuing and
    /// exhaustion of every channel, is reported through the returned
    /// [`DeliveryResult`].
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(idempotency_key = request.idempotency_key())
    )]
    pub async fn send(&self, request: DeliveryRequest) -> DeliveryResult {
        let key = request.idempotency_key();

        if !self.inner.idempotency.check_and_mark(key) {
            internal!(
                level = INFO,
                idempotency_key = key,
                "Duplicate request detected"
            );
            let error = DispatchError::Duplicate {
                key: key.unwrap_or_default().to_string(),
            };
            return DeliveryResult::failure(error.to_string()).with_idempotency_key(key);
        }

        if !self.any_available() {
            return self.defer(request);
        }

        let result = match self.attempt_channels(&request).await {
            Dispatch::Completed(result) => result,
            Dispatch::Unavailable => return self.defer(request),
        };

        if !self.inner.queue.is_empty() {
            self.trigger_drain();
        }

        result
    }

    /// Queue a request no channel can take and kick the drain procedure
    fn defer(&self, request: DeliveryRequest) -> DeliveryResult {
        internal!(
            level = WARN,
            idempotency_key = request.idempotency_key(),
            "All channels are rate limited or circuit open, queuing request"
        );

        let result = DeliveryResult::failure(DispatchError::AllChannelsUnavailable.to_string())
            .with_idempotency_key(request.idempotency_key());

        self.inner.queue.enqueue(request);
        self.trigger_drain();

        result
    }

    /// Try every channel in priority order until one delivers
    ///
    /// Shared by `send` and the drain procedure; the idempotency gate is not
    /// applied here.
    pub(super) async fn attempt_channels(&self, request: &DeliveryRequest) -> Dispatch {
        let mut attempted = false;
        let mut last_error = None;

        for (id, channel) in self.registered() {
            if !self.admit(&id) {
                continue;
            }

            attempted = true;
            match self.attempt_channel(&id, channel.as_ref(), request).await {
                Ok(result) => return Dispatch::Completed(result),
                Err(error) => {
                    internal!(
                        level = WARN,
                        channel = %id,
                        error = %error,
                        "All attempts failed, switching channel"
                    );
                    last_error = Some(error);
                }
            }
        }

        if !attempted {
            return Dispatch::Unavailable;
        }

        let key = request.idempotency_key();
        let exhausted = DispatchError::AllChannelsExhausted.to_string();

        self.inner.status.record(
            key.unwrap_or(UNKNOWN_REQUEST),
            AttemptRecord::now(false, ChannelId::all(), Some(exhausted.clone())),
        );
        internal!(
            level = ERROR,
            idempotency_key = key,
            "All channels failed"
        );

        let result = DeliveryResult::failure(exhausted).with_idempotency_key(key);
        Dispatch::Completed(match last_error {
            Some(error) => result.with_detail("lastError", serde_json::Value::String(error)),
            None => result,
        })
    }

    /// Run the bounded retry loop against one admitted channel
    ///
    /// Returns the successful result, or the error of the last attempt. The
    /// loop stops early if the circuit opens.
    async fn attempt_channel(
        &self,
        id: &ChannelId,
        channel: &dyn Channel,
        request: &DeliveryRequest,
    ) -> Result<DeliveryResult, String> {
        let retry = &self.inner.retry;
        let key = request.idempotency_key();
        let mut last_error = String::new();

        for attempt in 1..=retry.total_attempts() {
            outgoing!(level = DEBUG, channel = %id, attempt, "Attempting delivery");

            let (record_id, error) = match channel.send(request).await {
                Ok(mut result) if result.success => {
                    self.inner.status.record(
                        request_id(key, result.message_id.as_deref()),
                        AttemptRecord::now(true, id.clone(), None),
                    );
                    self.inner.circuit_breaker.record_success(id);

                    result.channel.get_or_insert_with(|| id.clone());
                    result.idempotency_key = key.map(ToString::to_string);

                    outgoing!(
                        level = INFO,
                        channel = %id,
                        attempt,
                        message_id = result.message_id.as_deref(),
                        "Delivered"
                    );
                    return Ok(result);
                }
                Ok(result) => {
                    let error = result
                        .error
                        .unwrap_or_else(|| DispatchError::unexplained().to_string());
                    outgoing!(
                        level = WARN,
                        channel = %id,
                        attempt,
                        error = %error,
                        "Channel reported failure"
                    );
                    (
                        request_id(key, result.message_id.as_deref()).to_string(),
                        error,
                    )
                }
                Err(fault) => {
                    let error = DispatchError::from(fault);
                    outgoing!(
                        level = ERROR,
                        channel = %id,
                        attempt,
                        error = %error,
                        "Channel fault"
                    );
                    (request_id(key, None).to_string(), error.to_string())
                }
            };

            self.inner.status.record(
                &record_id,
                AttemptRecord::now(false, id.clone(), Some(error.clone())),
            );
            last_error = error;
            self.inner.circuit_breaker.record_failure(id);

            if self.inner.circuit_breaker.get_state(id) == CircuitState::Open {
                break;
            }

            if retry.should_retry(attempt) {
                let delay = retry.backoff.delay(attempt);
                internal!(
                    level = DEBUG,
                    channel = %id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }
}

/// The history key for a request: its idempotency key, else the channel's
/// message id, else `unknown`
fn request_id<'a>(key: Option<&'a str>, message_id: Option<&'a str>) -> &'a str {
    key.or(message_id).unwrap_or(UNKNOWN_REQUEST)
}
