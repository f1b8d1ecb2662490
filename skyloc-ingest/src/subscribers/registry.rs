//! Subscriber registry and result fan-out
//!
//! The registry owns the set of live subscribers and a ring of the most recent
//! results. Broadcast pushes onto the ring and snapshots the set under one
//! lock, then delivers outside it, so a slow or broken subscriber never holds
//! up registration or other subscribers.
//!
//! **Delivery contract:**
//! - `deliver` never blocks; a subscriber that cannot keep up fails that one
//!   delivery and stays registered
//! - A subscriber registered with history sees every result exactly once:
//!   results broadcast before registration come from the history snapshot,
//!   results after it are delivered live

use crate::pipeline::stats::PipelineStats;
use serde::Serialize;
use skyloc_common::events::LocatedImage;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub type SubscriberId = Uuid;

/// Per-subscriber delivery failure
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Subscriber buffer full")]
    Full,

    #[error("Subscriber disconnected")]
    Closed,
}

/// Receiver of located results
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    /// Hand over one result without waiting
    fn deliver(&self, result: Arc<LocatedImage>) -> Result<(), DeliveryError>;
}

/// Subscriber backed by a bounded channel
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<LocatedImage>>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::Sender<Arc<LocatedImage>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Subscriber plus the receiving end of its buffer
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Arc<LocatedImage>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, result: Arc<LocatedImage>) -> Result<(), DeliveryError> {
        self.tx.try_send(result).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

struct RegistryState {
    subscribers: HashMap<SubscriberId, Arc<dyn Subscriber>>,
    history: VecDeque<Arc<LocatedImage>>,
}

pub struct SubscriberRegistry {
    state: Mutex<RegistryState>,
    history_capacity: usize,
    stats: Arc<PipelineStats>,
}

impl SubscriberRegistry {
    /// # Arguments
    /// * `history_capacity` - Recent results kept for replay (0 disables replay)
    pub fn new(history_capacity: usize, stats: Arc<PipelineStats>) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                subscribers: HashMap::new(),
                history: VecDeque::with_capacity(history_capacity),
            }),
            history_capacity,
            stats,
        }
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        let mut state = self.lock();
        self.insert(&mut state, subscriber);
    }

    /// Register and return the results broadcast so far, oldest first
    pub fn register_with_history(&self, subscriber: Arc<dyn Subscriber>) -> Vec<Arc<LocatedImage>> {
        let mut state = self.lock();
        self.insert(&mut state, subscriber);
        state.history.iter().cloned().collect()
    }

    /// Register with history; the returned guard unregisters on drop
    pub fn subscribe(
        self: &Arc<Self>,
        subscriber: Arc<dyn Subscriber>,
    ) -> (Vec<Arc<LocatedImage>>, SubscriptionGuard) {
        let id = subscriber.id();
        let backlog = self.register_with_history(subscriber);
        let guard = SubscriptionGuard {
            registry: Arc::clone(self),
            id,
        };
        (backlog, guard)
    }

    /// Remove a subscriber; returns whether it was registered
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut state = self.lock();
        let removed = state.subscribers.remove(&id).is_some();
        self.stats.subscribers.set(state.subscribers.len());

        if removed {
            debug!(subscriber = %id, "Subscriber unregistered ({} remaining)", state.subscribers.len());
        }
        removed
    }

    /// Deliver `result` to every currently registered subscriber
    pub fn broadcast(&self, result: Arc<LocatedImage>) -> BroadcastReport {
        let targets: Vec<Arc<dyn Subscriber>> = {
            let mut state = self.lock();
            if self.history_capacity > 0 {
                if state.history.len() == self.history_capacity {
                    state.history.pop_front();
                }
                state.history.push_back(Arc::clone(&result));
            }
            state.subscribers.values().cloned().collect()
        };

        let mut report = BroadcastReport::default();
        for subscriber in targets {
            match subscriber.deliver(Arc::clone(&result)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    self.stats.deliveries_failed.inc();
                    match e {
                        DeliveryError::Full => warn!(subscriber = %subscriber.id(), "Delivery failed: {}", e),
                        DeliveryError::Closed => debug!(subscriber = %subscriber.id(), "Delivery failed: {}", e),
                    }
                }
            }
        }

        debug!(
            "Broadcast '{}': {} delivered, {} failed",
            result.entity.text, report.delivered, report.failed
        );
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    fn insert(&self, state: &mut RegistryState, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id();
        state.subscribers.insert(id, subscriber);
        self.stats.subscribers.set(state.subscribers.len());
        debug!(subscriber = %id, "Subscriber registered ({} total)", state.subscribers.len());
    }

    // Every mutation is a single insert/remove/push, so a poisoned lock is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unregisters its subscriber when dropped
pub struct SubscriptionGuard {
    registry: Arc<SubscriberRegistry>,
    id: SubscriberId,
}

impl SubscriptionGuard {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skyloc_common::events::{EntityKind, LocatedEntity, OsmPlace};

    fn result(text: &str) -> Arc<LocatedImage> {
        Arc::new(LocatedImage {
            entity: LocatedEntity {
                text: text.to_string(),
                start_char: 0,
                end_char: text.len(),
                nlp_type: EntityKind::Gpe,
                closest_gpe: None,
                osm: OsmPlace {
                    osm_type: "node".to_string(),
                    osm_id: 7,
                    lat: "0".to_string(),
                    lon: "0".to_string(),
                    category: String::new(),
                    place_type: String::new(),
                    name: text.to_string(),
                    display_name: text.to_string(),
                    boundingbox: Vec::new(),
                },
            },
            image: json!({"alt": text}),
            event: json!({"kind": "commit"}),
        })
    }

    /// Records deliveries; optionally unregisters someone while being delivered to
    struct Recorder {
        id: SubscriberId,
        received: Mutex<Vec<String>>,
        on_deliver: Mutex<Option<(Arc<SubscriberRegistry>, SubscriberId)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: Uuid::new_v4(),
                received: Mutex::new(Vec::new()),
                on_deliver: Mutex::new(None),
            })
        }

        fn received(&self) -> Vec<String> {
            self.received.lock().unwrap().clone()
        }
    }

    impl Subscriber for Recorder {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn deliver(&self, result: Arc<LocatedImage>) -> Result<(), DeliveryError> {
            self.received.lock().unwrap().push(result.entity.text.clone());
            if let Some((registry, victim)) = self.on_deliver.lock().unwrap().take() {
                registry.unregister(victim);
            }
            Ok(())
        }
    }

    fn registry(history: usize) -> (Arc<SubscriberRegistry>, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::new());
        (Arc::new(SubscriberRegistry::new(history, Arc::clone(&stats))), stats)
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        let (registry, stats) = registry(8);
        let recorders: Vec<Arc<Recorder>> = (0..3).map(|_| Recorder::new()).collect();
        for recorder in &recorders {
            registry.register(Arc::clone(recorder) as Arc<dyn Subscriber>);
        }
        assert_eq!(stats.subscribers.get(), 3);

        let report = registry.broadcast(result("Lisbon"));

        assert_eq!(report, BroadcastReport { delivered: 3, failed: 0 });
        for recorder in &recorders {
            assert_eq!(recorder.received(), vec!["Lisbon"]);
        }
    }

    #[test]
    fn test_unregister_during_broadcast_applies_to_next() {
        let (registry, _) = registry(8);
        let unregisterer = Recorder::new();
        let victim = Recorder::new();
        *unregisterer.on_deliver.lock().unwrap() = Some((Arc::clone(&registry), victim.id));

        registry.register(Arc::clone(&unregisterer) as Arc<dyn Subscriber>);
        registry.register(Arc::clone(&victim) as Arc<dyn Subscriber>);

        // Victim is unregistered mid-broadcast but was already in the snapshot
        let first = registry.broadcast(result("first"));
        assert_eq!(first.delivered, 2);
        assert_eq!(victim.received(), vec!["first"]);

        let second = registry.broadcast(result("second"));
        assert_eq!(second.delivered, 1);
        assert_eq!(victim.received(), vec!["first"]);
        assert_eq!(unregisterer.received(), vec!["first", "second"]);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let (registry, stats) = registry(8);
        let recorder = Recorder::new();
        registry.register(Arc::clone(&recorder) as Arc<dyn Subscriber>);

        assert!(registry.unregister(recorder.id));
        assert!(!registry.unregister(recorder.id));
        assert!(!registry.unregister(Uuid::new_v4()));
        assert_eq!(registry.subscriber_count(), 0);
        assert_eq!(stats.subscribers.get(), 0);
    }

    #[tokio::test]
    async fn test_full_subscriber_isolated() {
        let (registry, stats) = registry(8);
        let (slow, mut slow_rx) = ChannelSubscriber::channel(1);
        let healthy = Recorder::new();
        registry.register(Arc::new(slow));
        registry.register(Arc::clone(&healthy) as Arc<dyn Subscriber>);

        registry.broadcast(result("one"));
        let report = registry.broadcast(result("two"));

        assert_eq!(report, BroadcastReport { delivered: 1, failed: 1 });
        assert_eq!(healthy.received(), vec!["one", "two"]);
        assert_eq!(registry.subscriber_count(), 2);
        assert_eq!(stats.deliveries_failed.get(), 1);
        assert_eq!(slow_rx.recv().await.unwrap().entity.text, "one");
    }

    #[test]
    fn test_closed_subscriber_reports_closed() {
        let (subscriber, rx) = ChannelSubscriber::channel(4);
        drop(rx);
        assert_eq!(subscriber.deliver(result("x")), Err(DeliveryError::Closed));
    }

    #[test]
    fn test_history_replay_is_bounded() {
        let (registry, _) = registry(3);
        for name in ["a", "b", "c", "d", "e"] {
            registry.broadcast(result(name));
        }
        assert_eq!(registry.history_len(), 3);

        let late = Recorder::new();
        let backlog = registry.register_with_history(Arc::clone(&late) as Arc<dyn Subscriber>);
        let names: Vec<&str> = backlog.iter().map(|r| r.entity.text.as_str()).collect();
        assert_eq!(names, vec!["c", "d", "e"]);

        // Live results follow without duplicating the backlog
        registry.broadcast(result("f"));
        assert_eq!(late.received(), vec!["f"]);
    }

    #[test]
    fn test_zero_history_disables_replay() {
        let (registry, _) = registry(0);
        registry.broadcast(result("a"));
        assert!(registry.register_with_history(Recorder::new()).is_empty());
    }

    #[test]
    fn test_guard_unregisters_on_drop() {
        let (registry, _) = registry(8);
        let (subscriber, _rx) = ChannelSubscriber::channel(4);

        let (_, guard) = registry.subscribe(Arc::new(subscriber));
        assert_eq!(registry.subscriber_count(), 1);

        drop(guard);
        assert_eq!(registry.subscriber_count(), 0);
    }
}
