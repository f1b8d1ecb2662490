//! HTTP API handlers for skyloc-ingest
//!
//! - `GET /feed`: live located results (SSE)
//! - `GET /stats`: pipeline counters, gauges and timings
//! - `GET /health`: liveness and uptime

pub mod health;
pub mod sse;

pub use health::health_routes;
pub use sse::located_event_stream;
