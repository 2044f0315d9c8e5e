use std::sync::{Arc, LazyLock};

use courier_api::{ApiConfig, ApiServer};
use courier_common::{
    Signal, internal,
    logging::{self, LoggingConfig},
    tracing,
};
use courier_dispatch::{Channel, DispatchConfig, Orchestrator};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::channels::{SimulatedChannel, SimulatedChannelConfig};

/// Top-level service configuration, read from `courier.config.ron`
#[derive(Debug, Deserialize)]
pub struct Courier {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Channels in priority order
    #[serde(alias = "channel", default = "SimulatedChannelConfig::defaults")]
    pub channels: Vec<SimulatedChannelConfig>,

    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for Courier {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            dispatch: DispatchConfig::default(),
            channels: SimulatedChannelConfig::defaults(),
            api: ApiConfig::default(),
        }
    }
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Courier {
    /// Build the orchestrator with every configured channel registered in order
    ///
    /// # Errors
    ///
    /// Returns an error if two channels share an id, or a channel uses a
    /// reserved id.
    pub fn build_orchestrator(&self) -> anyhow::Result<Orchestrator> {
        let channels = self
            .channels
            .iter()
            .map(|config| Arc::new(SimulatedChannel::new(config)) as Arc<dyn Channel>);

        let orchestrator = Orchestrator::with_channels(self.dispatch.clone(), channels)?;

        internal!(
            level = INFO,
            channels = ?orchestrator.channel_ids(),
            max_retries = self.dispatch.retry.max_retries,
            "Dispatcher initialised"
        );

        Ok(orchestrator)
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if logging cannot be initialised,
    /// the channel configuration is invalid, or the API server fails.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init(&self.logging)?;

        internal!("Controller running");

        let orchestrator = self.build_orchestrator()?;

        let ret = if self.api.enabled {
            let server = ApiServer::new(&self.api, orchestrator).await?;

            tokio::select! {
                r = server.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                    r.map_err(anyhow::Error::from)
                }
                r = shutdown() => {
                    r
                }
            }
        } else {
            internal!(level = WARN, "API disabled, waiting for shutdown");
            shutdown().await
        };

        internal!("Shutting down...");

        ret
    }
}
