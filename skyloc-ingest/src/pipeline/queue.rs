//! Ingest queue
//!
//! Fixed-capacity FIFO between the Accept and Extract stages. Pushing never
//! blocks the feed reader: once the queue is full the oldest event is evicted.
//! Popping suspends until an event is available.

use crate::pipeline::stats::PipelineStats;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

/// Default number of buffered events
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Bounded, drop-oldest FIFO queue
pub struct IngestQueue<T> {
    items: Mutex<VecDeque<T>>,
    /// Signalled once per push
    available: Notify,
    capacity: usize,
    stats: Arc<PipelineStats>,
}

impl<T> IngestQueue<T> {
    /// Create a queue holding at most `capacity` events (minimum 1)
    pub fn new(capacity: usize, stats: Arc<PipelineStats>) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            available: Notify::new(),
            capacity,
            stats,
        }
    }

    /// Append to the tail, evicting the head if the queue overflows
    ///
    /// Returns the evicted event, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.lock();
            self.stats.events_received.inc();
            items.push_back(item);

            let evicted = if items.len() > self.capacity {
                self.stats.events_dropped.inc();
                items.pop_front()
            } else {
                None
            };

            self.stats.queue_depth.set(items.len());
            evicted
        };

        if evicted.is_some() {
            debug!("Ingest queue full ({}), dropped oldest event", self.capacity);
        }

        self.available.notify_one();
        evicted
    }

    /// Remove and return the head, waiting while the queue is empty
    pub async fn pop(&self) -> T {
        loop {
            // Register interest before checking so a push between the check
            // and the await is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return item;
            }

            notified.await;
        }
    }

    /// Remove and return the head without waiting
    pub fn try_pop(&self) -> Option<T> {
        let mut items = self.lock();
        let item = items.pop_front();
        self.stats.queue_depth.set(items.len());
        item
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // The queue holds no invariant a panicking holder could break halfway
    // (push_back/pop_front are atomic), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
