//! Simulated delivery channels
//!
//! Stand-ins for external providers: each answers after a random latency,
//! succeeds with a configured probability and can optionally fault.

use std::time::Duration;

use async_trait::async_trait;
use courier_common::{ChannelId, DeliveryRequest, DeliveryResult, outgoing};
use courier_dispatch::{Channel, TransportError};
use rand::Rng;
use serde::Deserialize;

/// Configuration for one simulated channel
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatedChannelConfig {
    /// Channel identity, also the default message id prefix
    pub id: String,

    /// Probability that an answered request is delivered
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,

    /// Probability that a request faults instead of being answered
    #[serde(default)]
    pub fault_rate: f64,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Prefix of generated message ids, `<prefix>-<ulid>`
    #[serde(default)]
    pub message_id_prefix: Option<String>,
}

const fn default_success_rate() -> f64 {
    0.8
}

const fn default_min_delay_ms() -> u64 {
    100
}

const fn default_max_delay_ms() -> u64 {
    500
}

impl SimulatedChannelConfig {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success_rate: default_success_rate(),
            fault_rate: 0.0,
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            message_id_prefix: None,
        }
    }

    /// The two channels registered when none are configured
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                success_rate: 0.8,
                min_delay_ms: 100,
                max_delay_ms: 500,
                message_id_prefix: Some("A".to_string()),
                ..Self::new("channel-a")
            },
            Self {
                success_rate: 0.7,
                min_delay_ms: 200,
                max_delay_ms: 600,
                message_id_prefix: Some("B".to_string()),
                ..Self::new("channel-b")
            },
        ]
    }
}

/// What a single simulated send will do
enum Outcome {
    Deliver,
    Reject,
    Fault,
}

/// A channel that pretends to talk to a provider
#[derive(Debug)]
pub struct SimulatedChannel {
    id: ChannelId,
    prefix: String,
    success_rate: f64,
    fault_rate: f64,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl SimulatedChannel {
    #[must_use]
    pub fn new(config: &SimulatedChannelConfig) -> Self {
        let prefix = config
            .message_id_prefix
            .clone()
            .unwrap_or_else(|| config.id.clone());

        Self {
            id: ChannelId::new(config.id.as_str()),
            prefix,
            success_rate: config.success_rate.clamp(0.0, 1.0),
            fault_rate: config.fault_rate.clamp(0.0, 1.0),
            min_delay_ms: config.min_delay_ms.min(config.max_delay_ms),
            max_delay_ms: config.min_delay_ms.max(config.max_delay_ms),
        }
    }

    /// Roll the latency and outcome of one send
    fn roll(&self) -> (u64, Outcome) {
        let mut rng = rand::rng();
        let delay_ms = rng.random_range(self.min_delay_ms..=self.max_delay_ms);

        let outcome = if rng.random_bool(self.fault_rate) {
            Outcome::Fault
        } else if rng.random_bool(self.success_rate) {
            Outcome::Deliver
        } else {
            Outcome::Reject
        };

        (delay_ms, outcome)
    }
}

#[async_trait]
impl Channel for SimulatedChannel {
    fn id(&self) -> ChannelId {
        self.id.clone()
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryResult, TransportError> {
        let (delay_ms, outcome) = self.roll();
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        outgoing!(
            level = DEBUG,
            channel = %self.id,
            to = request.to(),
            delay_ms,
            "Simulated send"
        );

        let delay = serde_json::json!(delay_ms);
        match outcome {
            Outcome::Deliver => Ok(DeliveryResult::delivered(
                self.id.clone(),
                format!("{}-{}", self.prefix, ulid::Ulid::new()),
            )
            .with_detail("delayMs", delay)),
            Outcome::Reject => Ok(
                DeliveryResult::rejected(self.id.clone(), "Simulated failure")
                    .with_detail("delayMs", delay),
            ),
            Outcome::Fault => Err(TransportError::ConnectionFailed(format!(
                "{} unreachable after {delay_ms}ms",
                self.id
            ))),
        }
    }
}
