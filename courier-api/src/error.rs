//! Errors surfaced by [`ApiServer`](crate::ApiServer)
//!
//! Dispatch outcomes are never errors here: `POST /send-email` reports them
//! in the response body.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// `listen_address` could not be bound
    #[error("Failed to bind courier API to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// The bound socket could not report its address
    #[error("Unable to read courier API address: {0}")]
    LocalAddr(#[source] std::io::Error),

    /// Accepting or serving connections failed
    #[error("Courier API stopped unexpectedly: {0}")]
    Serve(#[source] std::io::Error),
}
