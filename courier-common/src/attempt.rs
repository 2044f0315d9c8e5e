use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ChannelId;

/// One entry in a request's attempt history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub success: bool,
    pub channel: ChannelId,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl AttemptRecord {
    /// Record an attempt that completed now
    #[must_use]
    pub fn now(success: bool, channel: ChannelId, error: Option<String>) -> Self {
        Self {
            success,
            channel,
            timestamp: Utc::now(),
            error,
        }
    }
}
