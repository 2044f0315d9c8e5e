//! Typed error handling for dispatch operations.
//!
//! The orchestrator never returns these to its caller as `Err`: every outcome
//! is folded into a [`DeliveryResult`](courier_common::DeliveryResult) whose
//! `error` string is the `Display` of one of these variants.

use courier_common::ChannelId;
use thiserror::Error;

/// Why a dispatch, or a single attempt within it, did not succeed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The idempotency key was already seen. Not retried.
    #[error("Duplicate request")]
    Duplicate { key: String },

    /// Every channel was rate-limited or circuit-open at dispatch time.
    /// The request has been queued, not lost.
    #[error("Request queued due to rate limiting or circuit open.")]
    AllChannelsUnavailable,

    /// A channel answered, but reported a logical failure.
    #[error("{0}")]
    ChannelSendFailure(String),

    /// A channel faulted instead of answering.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every channel's retry budget was spent without a success.
    #[error("All channels failed")]
    AllChannelsExhausted,
}

impl DispatchError {
    /// Failure reported by a channel that gave no reason
    pub(crate) fn unexplained() -> Self {
        Self::ChannelSendFailure("Channel reported failure".to_string())
    }
}

/// Faults a channel can raise instead of returning a result.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the provider.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider did not answer in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Malformed or unexpected answer from the provider.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Errors raised while registering channels with the orchestrator.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A channel with this id is already registered.
    #[error("Channel already registered: {0}")]
    DuplicateChannel(ChannelId),

    /// The id is reserved for the aggregate failure record.
    #[error("Channel id is reserved: {0}")]
    ReservedId(ChannelId),
}
