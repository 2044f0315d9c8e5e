//! End-to-end tests: HTTP requests through the API into simulated channels
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{net::SocketAddr, time::Duration};

use courier::{channels::SimulatedChannelConfig, controller::Courier};
use courier_api::{ApiConfig, ApiServer};
use courier_common::Signal;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::broadcast,
};

fn reliable(id: &str) -> SimulatedChannelConfig {
    SimulatedChannelConfig {
        success_rate: 1.0,
        min_delay_ms: 0,
        max_delay_ms: 5,
        ..SimulatedChannelConfig::new(id)
    }
}

fn unreliable(id: &str) -> SimulatedChannelConfig {
    SimulatedChannelConfig {
        success_rate: 0.0,
        ..reliable(id)
    }
}

async fn start(courier: Courier) -> (SocketAddr, broadcast::Sender<Signal>) {
    let config = ApiConfig {
        listen_address: "127.0.0.1:0".to_string(),
        ..courier.api.clone()
    };
    let orchestrator = courier.build_orchestrator().unwrap();
    let server = ApiServer::new(&config, orchestrator).await.unwrap();
    let address = server.local_addr().unwrap();

    let (sender, receiver) = broadcast::channel(1);
    tokio::spawn(server.serve(receiver));

    (address, sender)
}

/// Minimal HTTP/1.1 exchange, returning status code and body
async fn http(address: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, String) {
    let mut stream = TcpStream::connect(address).await.unwrap();

    let body = body.unwrap_or_default();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_string(&mut response))
        .await
        .expect("response in time")
        .unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();

    (status, body)
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_send_with_failover_and_status() {
    let mut courier = Courier {
        channels: vec![unreliable("first"), reliable("second")],
        ..Courier::default()
    };
    courier.dispatch.retry.max_retries = 0;
    let (address, shutdown) = start(courier).await;

    let (status, body) = http(address, "GET", "/", None).await;
    assert_eq!(status, 200);
    assert!(body.contains("Courier API is running."));

    let (status, body) = http(
        address,
        "POST",
        "/send-email",
        Some(r#"{"to":"user@example.com","subject":"Hello","body":"Welcome!","idempotencyKey":"e2e-1"}"#),
    )
    .await;
    assert_eq!(status, 200);
    let result: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["channel"], "second");
    assert!(result["messageId"].as_str().unwrap().starts_with("second-"));

    let (status, body) = http(address, "GET", "/status/e2e-1", None).await;
    assert_eq!(status, 200);
    let history: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(history[0]["channel"], "first");
    assert_eq!(history[0]["error"], "Simulated failure");
    assert_eq!(history[1]["channel"], "second");
    assert_eq!(history[1]["success"], true);

    let (status, body) = http(
        address,
        "POST",
        "/send-email",
        Some(r#"{"to":"user@example.com","subject":"Hello","body":"Welcome!","idempotencyKey":"e2e-1"}"#),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body.contains("Duplicate request"));

    shutdown.send(Signal::Shutdown).unwrap();
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn test_probes_and_channels() {
    let (address, shutdown) = start(Courier {
        channels: vec![reliable("only")],
        ..Courier::default()
    })
    .await;

    let (status, _) = http(address, "GET", "/health/live", None).await;
    assert_eq!(status, 200);

    let (status, _) = http(address, "GET", "/health/ready", None).await;
    assert_eq!(status, 200);

    let (status, body) = http(address, "GET", "/channels", None).await;
    assert_eq!(status, 200);
    let channels: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(channels[0]["id"], "only");
    assert_eq!(channels[0]["circuit"]["state"], "CLOSED");

    let (status, body) = http(address, "GET", "/status/never-sent", None).await;
    assert_eq!(status, 200);
    assert_eq!(body, "[]");

    shutdown.send(Signal::Shutdown).unwrap();
}
