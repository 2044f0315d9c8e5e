//! Per-channel rate limiting using a sliding window log
//!
//! Each channel keeps the timestamps of the requests it admitted within the
//! trailing window. A request is admitted only while fewer than
//! `max_requests` timestamps remain in the window, so no channel is ever
//! admitted more than `max_requests` times within any interval of
//! `window_ms`.
//!
//! # Example
//!
//! ```text
//! Rate limit: 3 per 1000ms
//! t=0ms    admit (1 in window)
//! t=100ms  admit (2)
//! t=200ms  admit (3)
//! t=300ms  reject, oldest entry expires at t=1000ms
//! t=1000ms admit (t=0 entry dropped, 3 in window)
//! ```

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use courier_common::{ChannelId, tracing};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per window, per channel
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Width of the sliding window (milliseconds)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Per-channel rate limit overrides
    #[serde(default)]
    pub channel_limits: ahash::AHashMap<String, ChannelRateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            channel_limits: ahash::AHashMap::default(),
        }
    }
}

const fn default_max_requests() -> u32 {
    60
}

const fn default_window_ms() -> u64 {
    60_000
}

/// Per-channel rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRateLimit {
    pub max_requests: u32,
    pub window_ms: u64,
}

/// Admission log for a single channel
#[derive(Debug)]
struct SlidingWindow {
    /// Admission times, oldest first
    admitted: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindow {
    fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            admitted: VecDeque::new(),
            max_requests: usize::try_from(max_requests).unwrap_or(usize::MAX),
            window: Duration::from_millis(window_ms),
        }
    }

    /// Drop admissions that have left the window
    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.admitted.front() {
            if now.duration_since(*oldest) >= self.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_capacity(&self, now: Instant) -> bool {
        let live = self
            .admitted
            .iter()
            .filter(|admitted| now.duration_since(**admitted) < self.window)
            .count();
        live < self.max_requests
    }

    fn try_admit(&mut self) -> bool {
        let now = Instant::now();
        self.evict(now);

        if self.admitted.len() < self.max_requests {
            self.admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Give back the most recent admission
    fn release(&mut self) {
        self.admitted.pop_back();
    }

    /// Time until the oldest admission leaves the window, or `None` if the
    /// window never admits anything
    fn time_until_available(&mut self) -> Option<Duration> {
        if self.max_requests == 0 {
            return None;
        }

        let now = Instant::now();
        self.evict(now);

        if self.admitted.len() < self.max_requests {
            return Some(Duration::ZERO);
        }

        Some(self.admitted.front().map_or(Duration::ZERO, |oldest| {
            self.window.saturating_sub(now.duration_since(*oldest))
        }))
    }
}

/// Per-channel rate limiter manager
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<ChannelId, Arc<parking_lot::Mutex<SlidingWindow>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    fn new_window(&self, channel: &ChannelId) -> SlidingWindow {
        let (max_requests, window_ms) = self.config.channel_limits.get(channel.as_str()).map_or(
            (self.config.max_requests, self.config.window_ms),
            |limit| (limit.max_requests, limit.window_ms),
        );
        SlidingWindow::new(max_requests, window_ms)
    }

    /// Install a fresh, empty window for a channel
    pub fn register(&self, channel: &ChannelId) {
        let window = self.new_window(channel);
        self.windows
            .insert(channel.clone(), Arc::new(parking_lot::Mutex::new(window)));
    }

    fn get_window(&self, channel: &ChannelId) -> Arc<parking_lot::Mutex<SlidingWindow>> {
        self.windows
            .entry(channel.clone())
            .or_insert_with(|| Arc::new(parking_lot::Mutex::new(self.new_window(channel))))
            .clone()
    }

    /// Admit a request for the channel if the window has room
    ///
    /// Records the admission and returns `true`, or returns `false` without
    /// side effects.
    pub fn is_allowed(&self, channel: &ChannelId) -> bool {
        let window = self.get_window(channel);
        let allowed = window.lock().try_admit();

        if !allowed {
            tracing::debug!(channel = %channel, "Rate limit exceeded");
        }

        allowed
    }

    /// Check, without recording anything, whether `is_allowed` would admit
    pub fn has_capacity(&self, channel: &ChannelId) -> bool {
        self.get_window(channel).lock().has_capacity(Instant::now())
    }

    /// Undo an admission that was granted but not used
    pub fn release(&self, channel: &ChannelId) {
        self.get_window(channel).lock().release();
    }

    /// How long until the channel can admit another request
    ///
    /// `None` if the channel is configured to admit nothing.
    pub fn time_until_available(&self, channel: &ChannelId) -> Option<Duration> {
        self.get_window(channel).lock().time_until_available()
    }

    pub fn get_stats(&self, channel: &ChannelId) -> RateLimitStats {
        let window = self.get_window(channel);
        let mut window = window.lock();
        window.evict(Instant::now());

        RateLimitStats {
            in_window: window.admitted.len(),
            max_requests: window.max_requests,
            window_ms: u64::try_from(window.window.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Statistics for a channel's rate limiter
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    /// Admissions currently inside the window
    pub in_window: usize,
    pub max_requests: usize,
    pub window_ms: u64,
}
