//! Retry and backoff policies for dispatch.
//!
//! - [`RetryPolicy`]: how many attempts a channel gets before failover
//! - [`BackoffPolicy`]: how long to wait between attempts on one channel

pub mod backoff;
pub mod retry;

pub use backoff::BackoffPolicy;
pub use retry::RetryPolicy;
