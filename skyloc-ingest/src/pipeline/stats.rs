//! Pipeline counters, gauges and timing histograms
//!
//! Lock-free atomics only: every stage bumps these on its hot path, and the
//! `/stats` endpoint reads a point-in-time snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds (seconds) of the timing histogram buckets
const BUCKET_BOUNDS_SECS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Point-in-time value
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, value: usize) {
        self.0.store(value as u64, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cumulative timing histogram with fixed buckets
#[derive(Debug, Default)]
pub struct TimingHistogram {
    /// One slot per bound, plus the overflow slot
    buckets: [AtomicU64; BUCKET_BOUNDS_SECS.len() + 1],
    count: AtomicU64,
    sum_micros: AtomicU64,
}

impl TimingHistogram {
    pub fn observe(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let slot = BUCKET_BOUNDS_SECS
            .iter()
            .position(|bound| secs <= *bound)
            .unwrap_or(BUCKET_BOUNDS_SECS.len());

        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let mut buckets = Vec::with_capacity(BUCKET_BOUNDS_SECS.len());
        for (bound, slot) in BUCKET_BOUNDS_SECS.iter().zip(&self.buckets) {
            cumulative += slot.load(Ordering::Relaxed);
            buckets.push(BucketSnapshot {
                le_secs: *bound,
                count: cumulative,
            });
        }

        HistogramSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum_secs: self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            buckets,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketSnapshot {
    pub le_secs: f64,
    /// Observations at or below `le_secs`
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_secs: f64,
    pub buckets: Vec<BucketSnapshot>,
}

/// Observability handle shared by every pipeline component
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Events pushed into the ingest queue (including later-dropped ones)
    pub events_received: Counter,
    /// Events evicted from a full ingest queue
    pub events_dropped: Counter,
    /// Feed messages that were not valid JSON
    pub events_malformed: Counter,
    /// Commit events with at least one image attachment
    pub commits_with_images: Counter,
    pub images_with_english_alt: Counter,
    pub images_with_location: Counter,
    /// Per-subscriber deliveries that failed (full or closed)
    pub deliveries_failed: Counter,
    pub queue_depth: Gauge,
    pub subscribers: Gauge,
    /// Distinct queries held by the geocode cache
    pub cache_entries: Gauge,
    pub extraction_time: TimingHistogram,
    pub geocode_doc_time: TimingHistogram,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.get(),
            events_dropped: self.events_dropped.get(),
            events_malformed: self.events_malformed.get(),
            commits_with_images: self.commits_with_images.get(),
            images_with_english_alt: self.images_with_english_alt.get(),
            images_with_location: self.images_with_location.get(),
            deliveries_failed: self.deliveries_failed.get(),
            queue_depth: self.queue_depth.get(),
            subscribers: self.subscribers.get(),
            cache_entries: self.cache_entries.get(),
            extraction_time: self.extraction_time.snapshot(),
            geocode_doc_time: self.geocode_doc_time.snapshot(),
        }
    }
}

/// Serializable view of [`PipelineStats`]
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub events_received: u64,
    pub events_dropped: u64,
    pub events_malformed: u64,
    pub commits_with_images: u64,
    pub images_with_english_alt: u64,
    pub images_with_location: u64,
    pub deliveries_failed: u64,
    pub queue_depth: u64,
    pub subscribers: u64,
    pub cache_entries: u64,
    pub extraction_time: HistogramSnapshot,
    pub geocode_doc_time: HistogramSnapshot,
}
