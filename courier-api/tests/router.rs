#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use courier_api::{ApiConfig, ApiServer, router};
use courier_common::{ChannelId, DeliveryRequest, DeliveryResult, Signal};
use courier_dispatch::{Channel, DispatchConfig, Orchestrator, TransportError};
use tower::ServiceExt;

struct Refusing;

#[async_trait]
impl Channel for Refusing {
    fn id(&self) -> ChannelId {
        ChannelId::new("refusing")
    }

    async fn send(&self, _: &DeliveryRequest) -> Result<DeliveryResult, TransportError> {
        Err(TransportError::ConnectionFailed("refused".to_string()))
    }
}

struct Accepting;

#[async_trait]
impl Channel for Accepting {
    fn id(&self) -> ChannelId {
        ChannelId::new("accepting")
    }

    async fn send(&self, _: &DeliveryRequest) -> Result<DeliveryResult, TransportError> {
        Ok(DeliveryResult::delivered(self.id(), "accepting-1"))
    }
}

fn orchestrator() -> Orchestrator {
    let mut config = DispatchConfig::default();
    config.retry.max_retries = 0;

    Orchestrator::with_channels(
        config,
        [
            Arc::new(Refusing) as Arc<dyn Channel>,
            Arc::new(Accepting) as Arc<dyn Channel>,
        ],
    )
    .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn send_request(body: &str) -> Request<Body> {
    Request::post("/send-email")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_send_then_status() {
    let app = router(&ApiConfig::default(), orchestrator());

    let response = app
        .clone()
        .oneshot(send_request(
            r#"{"to":"user@example.com","subject":"Hello","body":"Welcome!","idempotencyKey":"unique-key-1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = json_body(response).await;
    assert_eq!(result["success"], true);
    assert_eq!(result["channel"], "accepting");
    assert_eq!(result["idempotencyKey"], "unique-key-1");

    let response = app
        .oneshot(
            Request::get("/status/unique-key-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let history = json_body(response).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["channel"], "refusing");
    assert_eq!(history[0]["success"], false);
    assert_eq!(history[0]["error"], "Connection failed: refused");
    assert_eq!(history[1]["channel"], "accepting");
    assert_eq!(history[1]["success"], true);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = router(&ApiConfig::default(), orchestrator());

    let response = app.oneshot(send_request(r#"{"to": 5}"#)).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_channels_endpoint() {
    let app = router(&ApiConfig::default(), orchestrator());

    let response = app
        .oneshot(Request::get("/channels").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let channels = json_body(response).await;
    assert_eq!(channels[0]["id"], "refusing");
    assert_eq!(channels[0]["circuit"]["state"], "CLOSED");
    assert_eq!(channels[1]["id"], "accepting");
}

#[tokio::test]
async fn test_readiness_respects_queue_limit() {
    let config = ApiConfig {
        max_queue_size: 0,
        ..ApiConfig::default()
    };
    let orchestrator = Orchestrator::new(DispatchConfig::default());
    let app = router(&config, orchestrator.clone());

    let response = app
        .clone()
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    orchestrator.add_channel(Arc::new(Accepting)).unwrap();

    let response = app
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_server_shuts_down_on_signal() {
    let config = ApiConfig {
        listen_address: "127.0.0.1:0".to_string(),
        ..ApiConfig::default()
    };
    let server = ApiServer::new(&config, orchestrator()).await.unwrap();
    let address = server.local_addr().unwrap();
    assert_ne!(address.port(), 0);

    let (sender, receiver) = tokio::sync::broadcast::channel(1);
    let handle = tokio::spawn(server.serve(receiver));

    sender.send(Signal::Shutdown).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("server stopped")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_bind_error() {
    let config = ApiConfig {
        listen_address: "not-an-address".to_string(),
        ..ApiConfig::default()
    };

    let error = ApiServer::new(&config, orchestrator()).await.err().unwrap();
    assert!(error.to_string().contains("not-an-address"));
}
