//! Idempotency-key deduplication
//!
//! Keys are remembered from the moment a request is admitted. By default they
//! are remembered for the lifetime of the process; with a TTL configured, a
//! key becomes novel again once its TTL has passed and expired keys are
//! swept every [`PURGE_INTERVAL`] admissions.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use courier_common::tracing;
use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Deserialize, Serialize};

/// Admissions between sweeps of expired keys
const PURGE_INTERVAL: u32 = 1000;

/// Configuration for idempotency-key retention
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// How long a key is remembered (seconds). `None` keeps keys forever.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// Tracks idempotency keys that have already been admitted
#[derive(Debug)]
pub struct IdempotencyGuard {
    /// Key -> time it was admitted
    seen: DashMap<String, Instant>,
    ttl: Option<Duration>,
    ops_since_purge: AtomicU32,
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::new(&IdempotencyConfig::default())
    }
}

impl IdempotencyGuard {
    #[must_use]
    pub fn new(config: &IdempotencyConfig) -> Self {
        Self {
            seen: DashMap::new(),
            ttl: config.ttl_secs.map(Duration::from_secs),
            ops_since_purge: AtomicU32::new(0),
        }
    }

    fn is_live(&self, admitted_at: Instant, now: Instant) -> bool {
        self.ttl
            .is_none_or(|ttl| now.duration_since(admitted_at) < ttl)
    }

    /// Whether the key has been admitted and not yet expired
    ///
    /// A missing key is never seen.
    pub fn seen(&self, key: Option<&str>) -> bool {
        let Some(key) = key else {
            return false;
        };

        self.seen
            .get(key)
            .is_some_and(|admitted_at| self.is_live(*admitted_at, Instant::now()))
    }

    /// Remember the key as admitted now. A missing key is ignored.
    pub fn mark_seen(&self, key: Option<&str>) {
        if let Some(key) = key {
            self.seen.insert(key.to_string(), Instant::now());
        }
    }

    /// Atomically check and mark a key
    ///
    /// Returns `true` if the request is novel and has now been recorded, or
    /// `false` if the key was already admitted. Of several concurrent calls
    /// with the same key, exactly one returns `true`. A missing key is
    /// always novel.
    pub fn check_and_mark(&self, key: Option<&str>) -> bool {
        let Some(key) = key else {
            return true;
        };

        self.maybe_purge();

        let now = Instant::now();
        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.is_live(*entry.get(), now) {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    fn maybe_purge(&self) {
        if self.ttl.is_none() {
            return;
        }

        let ops = self.ops_since_purge.fetch_add(1, Ordering::Relaxed);
        if ops >= PURGE_INTERVAL {
            self.ops_since_purge.store(0, Ordering::Relaxed);
            let purged = self.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired idempotency keys");
            }
        }
    }

    /// Drop every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }

        let now = Instant::now();
        let before = self.seen.len();
        self.seen
            .retain(|_, admitted_at| self.is_live(*admitted_at, now));
        before.saturating_sub(self.seen.len())
    }

    /// Number of remembered keys, including any expired but not yet purged
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
