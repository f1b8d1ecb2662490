//! Ingest pipeline
//!
//! ```text
//! feed ──Accept──▶ IngestQueue ──Extract──▶ SubscriberRegistry
//! ```
//!
//! Stages share nothing but the queue, the registry and the stats handle.

pub mod accept;
pub mod event;
pub mod extract;
pub mod queue;
pub mod stats;
pub mod supervisor;

pub use accept::{AcceptStage, FeedError, FeedSource};
pub use event::InboundEvent;
pub use extract::ExtractStage;
pub use queue::IngestQueue;
pub use stats::{PipelineStats, StatsSnapshot};
pub use supervisor::Supervisor;
