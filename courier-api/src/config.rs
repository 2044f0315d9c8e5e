//! Settings for the courier HTTP API

use serde::Deserialize;

/// The `api` section of `courier.config.ron`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// When `false` the controller dispatches nothing over HTTP and only
    /// waits for shutdown
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Socket address for `/send-email`, `/status`, `/channels` and the probes.
    /// Port `0` picks a free port.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Seconds before a client gets a timeout response. The dispatch it
    /// started keeps running and its attempts still land in the history.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// `/health/ready` reports 503 once more requests than this wait in the
    /// overflow queue
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

const fn default_enabled() -> bool {
    true
}

fn default_listen_address() -> String {
    "[::]:3000".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_queue_size() -> usize {
    10_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_address: default_listen_address(),
            request_timeout_secs: default_request_timeout_secs(),
            max_queue_size: default_max_queue_size(),
        }
    }
}
