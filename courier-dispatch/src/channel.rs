//! The delivery channel capability

use async_trait::async_trait;
use courier_common::{ChannelId, DeliveryRequest, DeliveryResult};

use crate::TransportError;

/// An interchangeable delivery backend
///
/// The orchestrator depends only on this trait. A channel either answers with
/// a [`DeliveryResult`] (whose `success` flag may be `false`), or faults with a
/// [`TransportError`]; both non-successes are retried and fed to the circuit
/// breaker the same way.
///
/// # Example
///
/// ```rust,ignore
/// struct Always;
///
/// #[async_trait]
/// impl Channel for Always {
///     fn id(&self) -> ChannelId {
///         ChannelId::new("always")
///     }
///
///     async fn send(&self, _: &DeliveryRequest) -> Result<DeliveryResult, TransportError> {
///         Ok(DeliveryResult::delivered(self.id(), "always-1"))
///     }
/// }
/// ```
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable identity; keys the channel's circuit breaker and rate limit
    fn id(&self) -> ChannelId;

    /// Attempt delivery once
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the provider could not be reached or
    /// answered with something that is not a result.
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryResult, TransportError>;
}
