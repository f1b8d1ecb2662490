//! Accept stage: upstream feed → ingest queue
//!
//! Reads one message at a time and keeps only commits with image attachments.
//! The feed is expected to run forever; it ending, failing, or staying silent
//! past the idle timeout stops the stage with an error.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::event::InboundEvent;
use crate::pipeline::queue::IngestQueue;
use crate::pipeline::stats::PipelineStats;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Feed transport error: {0}")]
    Transport(String),

    #[error("No feed message for {0:?}")]
    Idle(Duration),
}

/// Source of raw upstream messages
#[async_trait]
pub trait FeedSource: Send {
    /// Next raw message; `Ok(None)` once the feed has ended
    async fn next_message(&mut self) -> Result<Option<String>, FeedError>;
}

/// What became of one feed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    Enqueued,
    Ignored,
    Malformed,
}

pub struct AcceptStage {
    feed: Box<dyn FeedSource>,
    queue: Arc<IngestQueue<InboundEvent>>,
    stats: Arc<PipelineStats>,
    idle_timeout: Duration,
}

impl AcceptStage {
    pub fn new(
        feed: Box<dyn FeedSource>,
        queue: Arc<IngestQueue<InboundEvent>>,
        stats: Arc<PipelineStats>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            feed,
            queue,
            stats,
            idle_timeout,
        }
    }

    /// Filter one raw message into the queue
    pub fn accept_message(&self, raw: &str) -> Accepted {
        match InboundEvent::parse(raw) {
            Ok(Some(event)) => {
                self.stats.commits_with_images.inc();
                debug!("Enqueued commit with {} images", event.images().len());
                self.queue.push(event);
                Accepted::Enqueued
            }
            Ok(None) => Accepted::Ignored,
            Err(e) => {
                self.stats.events_malformed.inc();
                warn!("Discarding malformed feed message: {}", e);
                Accepted::Malformed
            }
        }
    }

    /// Run until the feed fails; never returns `Ok`
    pub async fn run(mut self) -> PipelineResult<()> {
        info!("Accept stage started (idle timeout {:?})", self.idle_timeout);

        loop {
            let next = tokio::time::timeout(self.idle_timeout, self.feed.next_message()).await;

            let raw = match next {
                Ok(Ok(Some(raw))) => raw,
                Ok(Ok(None)) => {
                    error!("Upstream feed closed");
                    return Err(PipelineError::FeedClosed);
                }
                Ok(Err(e)) => {
                    error!("Upstream feed failed: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    error!("Upstream feed idle for {:?}", self.idle_timeout);
                    return Err(FeedError::Idle(self.idle_timeout).into());
                }
            };

            self.accept_message(&raw);
        }
    }
}
