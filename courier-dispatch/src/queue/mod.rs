//! Overflow queue for requests no channel could take

use std::{collections::VecDeque, sync::Arc};

use courier_common::DeliveryRequest;
use parking_lot::Mutex;

/// Strict FIFO of deferred requests
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct OverflowQueue {
    entries: Arc<Mutex<VecDeque<DeliveryRequest>>>,
}

impl OverflowQueue {
    /// Create a new empty overflow queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request at the tail
    pub fn enqueue(&self, request: DeliveryRequest) {
        self.entries.lock().push_back(request);
    }

    /// Take the request at the head
    pub fn dequeue(&self) -> Option<DeliveryRequest> {
        self.entries.lock().pop_front()
    }

    /// Put a dequeued request back at the head, ahead of everything queued
    /// since it was taken
    pub fn requeue_front(&self, request: DeliveryRequest) {
        self.entries.lock().push_front(request);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
