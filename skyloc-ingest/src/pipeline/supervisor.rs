//! Fail-fast stage supervision
//!
//! Every stage is expected to run for the life of the process. The first one
//! to finish, whether by error, by returning, or by panicking, stops all the
//! others and its reason becomes the process exit reason.

use crate::error::{PipelineError, PipelineResult};
use futures::future::select_all;
use std::any::Any;
use std::future::Future;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

#[derive(Default)]
pub struct Supervisor {
    names: Vec<&'static str>,
    handles: Vec<JoinHandle<PipelineResult<()>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `stage` as an independent task
    pub fn spawn<F>(&mut self, name: &'static str, stage: F)
    where
        F: Future<Output = PipelineResult<()>> + Send + 'static,
    {
        info!("Starting stage '{}'", name);
        self.names.push(name);
        self.handles.push(tokio::spawn(stage));
    }

    /// Wait for the first stage to stop, abort the rest, and report why
    pub async fn wait(self) -> PipelineError {
        if self.handles.is_empty() {
            return PipelineError::StageExited("supervisor");
        }

        let (outcome, index, remaining) = select_all(self.handles).await;
        let stage = self.names[index];

        for handle in remaining {
            handle.abort();
        }

        let reason = stage_failure(stage, outcome);
        error!("Stage '{}' stopped: {}", stage, reason);
        reason
    }
}

fn stage_failure(stage: &'static str, outcome: Result<PipelineResult<()>, JoinError>) -> PipelineError {
    match outcome {
        Ok(Ok(())) => PipelineError::StageExited(stage),
        Ok(Err(e)) => e,
        Err(e) if e.is_panic() => PipelineError::StagePanicked {
            stage,
            message: panic_message(e.into_panic()),
        },
        Err(_) => PipelineError::StageExited(stage),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
