//! Per-request attempt history

use courier_common::AttemptRecord;
use dashmap::DashMap;

/// Append-only attempt history keyed by request identity
///
/// Records for one id are kept in the order they were recorded. Nothing is
/// ever removed or reordered.
#[derive(Debug, Default)]
pub struct StatusTracker {
    history: DashMap<String, Vec<AttemptRecord>>,
}

impl StatusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, request_id: &str, record: AttemptRecord) {
        self.history
            .entry(request_id.to_string())
            .or_default()
            .push(record);
    }

    /// Every record for the id, oldest first. Empty if the id is unknown.
    pub fn history(&self, request_id: &str) -> Vec<AttemptRecord> {
        self.history
            .get(request_id)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn latest(&self, request_id: &str) -> Option<AttemptRecord> {
        self.history
            .get(request_id)
            .and_then(|records| records.last().cloned())
    }

    /// Number of distinct request ids with history
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
