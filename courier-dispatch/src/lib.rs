//! Dispatch orchestration for outbound messages
//!
//! This crate provides functionality to:
//! - Dispatch a request through an ordered list of interchangeable channels
//! - Retry each channel with jittered exponential backoff before failing over
//! - Gate channels on a per-channel sliding-window rate limit and circuit breaker
//! - Reject duplicate submissions by idempotency key
//! - Queue requests when no channel is usable and drain them as channels recover
//! - Record the history of every attempt per request

mod channel;
pub mod circuit_breaker;
mod error;
mod idempotency;
mod orchestrator;
pub mod policy;
mod queue;
pub mod rate_limiter;
mod status;

pub use channel::Channel;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
// Re-export common types
pub use courier_common::{AttemptRecord, ChannelId, DeliveryRequest, DeliveryResult};
pub use error::{DispatchError, RegistrationError, TransportError};
pub use idempotency::{IdempotencyConfig, IdempotencyGuard};
pub use orchestrator::{ChannelSnapshot, DispatchConfig, Orchestrator};
pub use policy::{BackoffPolicy, RetryPolicy};
pub use queue::OverflowQueue;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use status::StatusTracker;
