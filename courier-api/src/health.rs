//! Readiness evaluation

use courier_dispatch::Orchestrator;
use serde::Serialize;

/// Why the service is, or is not, ready to take traffic
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessStatus {
    pub ready: bool,
    /// Registered channels
    pub channels: usize,
    /// Requests waiting in the overflow queue
    pub queue_size: usize,
    pub max_queue_size: usize,
}

impl ReadinessStatus {
    /// Ready iff at least one channel is registered and the overflow queue
    /// is no longer than `max_queue_size`
    #[must_use]
    pub fn evaluate(orchestrator: &Orchestrator, max_queue_size: usize) -> Self {
        let channels = orchestrator.channel_count();
        let queue_size = orchestrator.queue_len();

        Self {
            ready: channels > 0 && queue_size <= max_queue_size,
            channels,
            queue_size,
            max_queue_size,
        }
    }
}
