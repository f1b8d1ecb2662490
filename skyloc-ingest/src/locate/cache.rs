//! Rate-limited geocoding cache
//!
//! Maps a query string to its resolved place, calling the geocoder at most
//! once per distinct query for as long as the query stays in the LRU:
//!
//! - The LRU only holds settled answers. "Found" and "not found" are both
//!   stored; transport failures are not, so the next resolve tries again.
//! - A lookup in progress is tracked outside the LRU. Concurrent resolves of
//!   the same query wait on the leader's watch channel and receive its
//!   outcome, `Unavailable` included.
//! - Every outbound attempt, retries included, is admitted by the shared
//!   [`MinIntervalGate`]. Cache hits never touch the gate.

use crate::locate::gate::MinIntervalGate;
use crate::pipeline::stats::PipelineStats;
use crate::services::nominatim_client::{GeocodeError, Geocoder};
use async_trait::async_trait;
use lru::LruCache;
use skyloc_common::config::GeocoderConfig;
use skyloc_common::events::OsmPlace;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lookup failure visible to callers, distinct from "not found"
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("Geocoder temporarily unavailable for {query:?} after {attempts} attempts: {source}")]
    Unavailable {
        query: String,
        attempts: u32,
        #[source]
        source: GeocodeError,
    },
}

type Outcome = Result<Option<OsmPlace>, ResolveError>;

/// Query → place lookup used by the location resolver
#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<Option<OsmPlace>, ResolveError>;
}

struct Slots {
    resolved: LruCache<String, Option<OsmPlace>>,
    /// Receivers for lookups in progress; `None` until the leader publishes
    in_flight: HashMap<String, watch::Receiver<Option<Outcome>>>,
}

enum Claim {
    Hit(Option<OsmPlace>),
    Wait(watch::Receiver<Option<Outcome>>),
    Lead(watch::Sender<Option<Outcome>>, watch::Receiver<Option<Outcome>>),
}

/// In-flight marker owned by the leading resolve
///
/// Dropping it unsettled (the leader was cancelled) clears the marker so
/// waiters can claim the lookup themselves.
struct Lead<'a> {
    cache: &'a GeocodeCache,
    query: &'a str,
    marker: watch::Receiver<Option<Outcome>>,
    settled: bool,
}

impl Lead<'_> {
    fn settle(mut self, outcome: &Outcome) {
        let mut slots = self.cache.lock();
        slots.in_flight.remove(self.query);
        if let Ok(place) = outcome {
            slots.resolved.put(self.query.to_string(), place.clone());
        }
        if let Some(stats) = &self.cache.stats {
            stats.cache_entries.set(slots.resolved.len());
        }
        self.settled = true;
    }
}

impl Drop for Lead<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut slots = self.cache.lock();
        let ours = slots
            .in_flight
            .get(self.query)
            .is_some_and(|rx| rx.same_channel(&self.marker));
        if ours {
            slots.in_flight.remove(self.query);
        }
    }
}

pub struct GeocodeCache {
    geocoder: Arc<dyn Geocoder>,
    gate: MinIntervalGate,
    slots: Mutex<Slots>,
    max_retries: u32,
    stats: Option<Arc<PipelineStats>>,
}

impl GeocodeCache {
    /// # Arguments
    /// * `capacity` - Distinct queries kept before LRU eviction (minimum 1)
    /// * `max_retries` - Extra attempts after a transport failure
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        gate: MinIntervalGate,
        capacity: usize,
        max_retries: u32,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            geocoder,
            gate,
            slots: Mutex::new(Slots {
                resolved: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
            max_retries,
            stats: None,
        }
    }

    /// Report the entry count through `stats`
    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn from_config(geocoder: Arc<dyn Geocoder>, config: &GeocoderConfig) -> Self {
        info!(
            "Geocode cache: capacity {}, min interval {:?}, {} retries",
            config.cache_capacity,
            config.min_interval(),
            config.max_retries
        );
        Self::new(
            geocoder,
            MinIntervalGate::new(config.min_interval()),
            config.cache_capacity,
            config.max_retries,
        )
    }

    /// Resolve `query` to a place
    ///
    /// # Returns
    /// * `Ok(Some(place))` - Resolved (possibly from cache)
    /// * `Ok(None)` - Provider has no match (cached)
    /// * `Err(ResolveError::Unavailable)` - Provider unreachable after retries
    pub async fn resolve(&self, query: &str) -> Result<Option<OsmPlace>, ResolveError> {
        loop {
            match self.claim(query) {
                Claim::Hit(place) => {
                    debug!(query = %query, "Geocode cache hit");
                    return Ok(place);
                }
                Claim::Wait(mut rx) => {
                    let shared = match rx.wait_for(Option::is_some).await {
                        Ok(outcome) => outcome.clone(),
                        Err(_) => None,
                    };
                    if let Some(outcome) = shared {
                        return outcome;
                    }
                    // Leader went away before publishing
                    debug!(query = %query, "Geocode leader dropped, claiming again");
                }
                Claim::Lead(tx, marker) => {
                    let lead = Lead {
                        cache: self,
                        query,
                        marker,
                        settled: false,
                    };
                    let outcome = self.fetch(query).await;
                    lead.settle(&outcome);
                    tx.send_replace(Some(outcome.clone()));
                    return outcome;
                }
            }
        }
    }

    /// Number of queries currently held
    pub fn len(&self) -> usize {
        self.lock().resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, query: &str) -> bool {
        self.lock().resolved.contains(query)
    }

    fn claim(&self, query: &str) -> Claim {
        let mut slots = self.lock();
        if let Some(place) = slots.resolved.get(query) {
            return Claim::Hit(place.clone());
        }
        if let Some(rx) = slots.in_flight.get(query) {
            // A closed sender means the leader was cancelled; take over
            if rx.has_changed().is_ok() {
                return Claim::Wait(rx.clone());
            }
        }

        let (tx, rx) = watch::channel(None);
        slots.in_flight.insert(query.to_string(), rx.clone());
        Claim::Lead(tx, rx)
    }

    async fn fetch(&self, query: &str) -> Outcome {
        let attempts = self.max_retries + 1;
        let mut attempt = 1;

        loop {
            self.gate.admit().await;

            match self.geocoder.geocode(query).await {
                Ok(place) => {
                    match &place {
                        Some(place) => debug!(query = %query, place = %place.display_name, "Geocoded"),
                        None => debug!(query = %query, "No geocoding match"),
                    }
                    return Ok(place);
                }
                Err(e) if attempt < attempts => {
                    warn!(query = %query, attempt, "Geocoder call failed, retrying: {}", e);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ResolveError::Unavailable {
                        query: query.to_string(),
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }

    // Every mutation is a single map operation, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PlaceLookup for GeocodeCache {
    async fn lookup(&self, query: &str) -> Result<Option<OsmPlace>, ResolveError> {
        self.resolve(query).await
    }
}
