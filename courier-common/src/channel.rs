//! Channel identifier newtype
//!
//! Wraps channel names so that idempotency keys, message ids and other
//! strings cannot be passed where a channel is expected.

use std::{
    borrow::Borrow,
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Identifier used in attempt records when every channel has been exhausted
const ALL_CHANNELS: &str = "all";

/// The identity of a delivery channel
///
/// Cheap to clone; channel state (circuit breaker, rate-limit window) is keyed
/// by this value.
///
/// # Examples
///
/// ```
/// use courier_common::ChannelId;
///
/// let id = ChannelId::new("channel-a");
/// assert_eq!(id.as_str(), "channel-a");
///
/// let id: ChannelId = "channel-b".into();
/// assert_eq!(id.to_string(), "channel-b");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ChannelId(Arc<str>);

impl ChannelId {
    #[must_use]
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    /// The pseudo-channel recorded when a request failed on every channel
    #[must_use]
    pub fn all() -> Self {
        Self::new(ALL_CHANNELS)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the [`ChannelId::all`] pseudo-channel
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.as_str() == ALL_CHANNELS
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for ChannelId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ChannelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
