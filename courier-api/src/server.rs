//! API HTTP server

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use courier_common::{DeliveryRequest, Signal, incoming};
use courier_dispatch::Orchestrator;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::{ApiConfig, ApiError, ReadinessStatus};

#[derive(Debug, Clone)]
struct AppState {
    orchestrator: Orchestrator,
    max_queue_size: usize,
}

/// Build the API router around an orchestrator
pub fn router(config: &ApiConfig, orchestrator: Orchestrator) -> Router {
    let state = AppState {
        orchestrator,
        max_queue_size: config.max_queue_size,
    };

    Router::new()
        .route("/", get(root_handler))
        .route("/send-email", post(send_handler))
        .route("/status/{id}", get(status_handler))
        .route("/channels", get(channels_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
}

/// API HTTP server
pub struct ApiServer {
    listener: TcpListener,
    router: Router,
}

impl ApiServer {
    /// Bind the API server
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn new(config: &ApiConfig, orchestrator: Orchestrator) -> Result<Self, ApiError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ApiError::Bind {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(
            address = %config.listen_address,
            "API server bound successfully"
        );

        Ok(Self {
            listener,
            router: router(config, orchestrator),
        })
    }

    /// The address actually bound, useful when listening on port 0
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ApiError> {
        self.listener
            .local_addr()
            .map_err(ApiError::LocalAddr)
    }

    /// Run the API server until shutdown signal is received
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ApiError> {
        tracing::info!("API server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("API server received shutdown signal");
            })
            .await
            .map_err(ApiError::Serve)?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Courier API is running." }))
}

/// Dispatch handler
///
/// The dispatch runs on its own task, so a client that disconnects or times
/// out does not cancel an in-flight send. Logical failures are still 200.
async fn send_handler(
    State(state): State<AppState>,
    Json(request): Json<DeliveryRequest>,
) -> Response {
    incoming!(
        level = INFO,
        idempotency_key = request.idempotency_key(),
        "Received send request"
    );

    let orchestrator = state.orchestrator.clone();
    match tokio::spawn(async move { orchestrator.send(request).await }).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

async fn status_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    Json(state.orchestrator.history(&id)).into_response()
}

async fn channels_handler(State(state): State<AppState>) -> Response {
    Json(state.orchestrator.channel_snapshots()).into_response()
}

/// Liveness probe handler
///
/// Returns 200 OK whenever the server can answer at all.
async fn liveness_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Readiness probe handler
async fn readiness_handler(State(state): State<AppState>) -> Response {
    let status = ReadinessStatus::evaluate(&state.orchestrator, state.max_queue_size);

    if status.ready {
        (StatusCode::OK, "OK").into_response()
    } else {
        tracing::warn!(
            channels = status.channels,
            queue_size = status.queue_size,
            max_queue_size = status.max_queue_size,
            "Readiness probe failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}
