//! Types shared by every courier crate
//!
//! - [`DeliveryRequest`] / [`DeliveryResult`]: the request and response model
//! - [`AttemptRecord`]: one entry in a request's attempt history
//! - [`ChannelId`]: identity of a delivery channel
//! - [`logging`]: subscriber setup and the `internal!` family of macros

pub mod attempt;
pub mod channel;
pub mod error;
pub mod logging;
pub mod request;
pub mod result;

pub use attempt::AttemptRecord;
pub use channel::ChannelId;
pub use error::LoggingError;
pub use request::DeliveryRequest;
pub use result::DeliveryResult;
pub use tracing;

/// Broadcast to long-running tasks when the process is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
