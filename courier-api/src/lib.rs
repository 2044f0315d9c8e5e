//! HTTP interface for the courier dispatcher
//!
//! # Endpoints
//!
//! - **`GET /`** - Banner, confirms the API is up
//! - **`POST /send-email`** - Dispatch a request; always answers with a
//!   `DeliveryResult`, with status 200 even for logical failures
//! - **`GET /status/{id}`** - Attempt history for a request id
//! - **`GET /channels`** - Circuit and rate-limit state of every channel
//! - **`GET /health/live`** - Liveness probe
//! - **`GET /health/ready`** - Readiness probe: at least one channel and a
//!   queue within `max_queue_size`
//!
//! # Usage
//!
//! ```rust,no_run
//! use courier_api::{ApiConfig, ApiServer};
//! use courier_dispatch::{DispatchConfig, Orchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(DispatchConfig::default());
//! let server = ApiServer::new(&ApiConfig::default(), orchestrator).await?;
//!
//! // server.serve(shutdown_receiver).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod health;
mod server;

pub use config::ApiConfig;
pub use error::ApiError;
pub use health::ReadinessStatus;
pub use server::{ApiServer, router};
