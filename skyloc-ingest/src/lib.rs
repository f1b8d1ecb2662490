//! skyloc-ingest library interface
//!
//! Exposes the pipeline components for the binary and for integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod locate;
pub mod pipeline;
pub mod services;
pub mod subscribers;

pub use crate::error::{PipelineError, PipelineResult};

use axum::Router;
use chrono::{DateTime, Utc};
use pipeline::PipelineStats;
use std::sync::Arc;
use subscribers::SubscriberRegistry;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    pub stats: Arc<PipelineStats>,
    /// Results buffered per `/feed` connection before deliveries fail
    pub subscriber_buffer: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Arc<SubscriberRegistry>, stats: Arc<PipelineStats>, subscriber_buffer: usize) -> Self {
        Self {
            registry,
            stats,
            subscriber_buffer,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/feed", get(api::located_event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
