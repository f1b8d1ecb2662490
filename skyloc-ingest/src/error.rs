//! Error types for skyloc-ingest
//!
//! Only fatal conditions reach this level. Per-item failures (an unresolvable
//! query, a full subscriber) are handled where they happen and never surface
//! as a `PipelineError`.

use crate::pipeline::accept::FeedError;
use crate::services::entity_extractor::ExtractionError;
use thiserror::Error;

/// Reason the pipeline stopped
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upstream feed failed or went idle
    #[error("Feed lost: {0}")]
    Feed(#[from] FeedError),

    /// Upstream feed ended cleanly, which it never should
    #[error("Feed closed by upstream")]
    FeedClosed,

    /// Entity extraction service unavailable after retries
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// A long-running stage returned
    #[error("Stage '{0}' exited unexpectedly")]
    StageExited(&'static str),

    /// A long-running stage panicked
    #[error("Stage '{stage}' panicked: {message}")]
    StagePanicked { stage: &'static str, message: String },

    /// HTTP server failed
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// skyloc-common error
    #[error("Common error: {0}")]
    Common(#[from] skyloc_common::Error),
}

/// Result type for pipeline stages
pub type PipelineResult<T> = Result<T, PipelineError>;
