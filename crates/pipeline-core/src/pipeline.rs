//! Pipeline assembly and lifecycle controller.
//!
//! Collects stages in processing order, links them into a chain before
//! anything starts, and drives the whole chain through a single `start()`
//! (cascading tail-first) and a single `stop()` (cascading head-first).

use std::sync::Arc;

use tracing::info;

use crate::{PipelineError, Stage};

/// An assembled, linked chain of stages.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { stages: Vec::new() }
    }

    /// First stage of the chain; new work enters here.
    pub fn head(&self) -> &Arc<dyn Stage> {
        &self.stages[0]
    }

    /// Last stage of the chain; jobs that reach it with success end up
    /// `Completed`.
    pub fn terminal(&self) -> &Arc<dyn Stage> {
        self.stages.last().expect("builder rejects empty pipelines")
    }

    /// Bring the whole chain up, tail-first. Returns once every stage's
    /// workers are alive.
    pub fn start(&self) {
        info!(stages = self.stages.len(), "starting pipeline");
        self.head().start();
    }

    /// Tear the whole chain down, head-first, waiting for in-flight work.
    pub fn stop(&self) {
        info!("stopping pipeline");
        self.head().stop();
        info!("pipeline stopped");
    }

    /// True while any stage still has a live worker thread.
    pub fn is_running(&self) -> bool {
        self.stages.iter().any(|stage| stage.is_running())
    }
}

/// Builder that wires stages together in the order they were added.
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelineBuilder {
    /// Append a stage to the end of the chain.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Link every stage to its successor. Must run before `start()`; the
    /// forwarding targets are never reassigned afterwards.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        for pair in self.stages.windows(2) {
            pair[0].set_next(Arc::clone(&pair[1]));
        }
        Ok(Pipeline {
            stages: self.stages,
        })
    }
}
