//! # Pipeline Core
//!
//! A small execution engine that moves jobs through an ordered chain of
//! processing stages, each running on its own worker thread(s) and handing
//! finished work to the next stage through a queue.
//!
//! ## Stage runtimes
//!
//! - [`SourceStage`] — first stage; polls a [`Source`] for newly ready jobs.
//! - [`SerialStage`] — one queue, one worker thread, strict FIFO service.
//! - [`PoolStage`] — one shared queue, N worker threads racing to dequeue,
//!   each bound to its own processor (load balanced, exactly-once, unordered).
//!
//! Stages are linked with [`Stage::set_next`] before anything starts. A
//! single `start()` on the head brings the chain up tail-first; a single
//! `stop()` tears it down head-first, waiting for in-flight work.
//!
//! ```no_run
//! # use pipeline_core::{Pipeline, SerialStage, Processor, Job, PipelineError};
//! # struct Encode; struct Publish;
//! # impl Processor for Encode {
//! #     fn name(&self) -> &str { "encode" }
//! #     fn process(&mut self, _job: &Job) -> Result<(), PipelineError> { Ok(()) }
//! # }
//! # impl Processor for Publish {
//! #     fn name(&self) -> &str { "publish" }
//! #     fn process(&mut self, _job: &Job) -> Result<(), PipelineError> { Ok(()) }
//! # }
//! let pipeline = Pipeline::builder()
//!     .stage(SerialStage::new("encode", Encode))
//!     .stage(SerialStage::new("publish", Publish))
//!     .build()?;
//! pipeline.start();
//! // ... enqueue work on pipeline.head(), later:
//! pipeline.stop();
//! # Ok::<(), PipelineError>(())
//! ```

use thiserror::Error;

mod job;
mod pipeline;
mod pool;
mod processor;
mod serial;
mod source;
mod stage;
mod worker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use job::{Job, JobStatus};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use pool::PoolStage;
pub use processor::{Processor, Source};
pub use serial::SerialStage;
pub use source::SourceStage;
pub use stage::Stage;

/// Common error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue closed: {0}")]
    QueueClosed(&'static str),

    #[error("source stages create their own jobs and do not accept enqueues")]
    SourceEnqueue,

    #[error("pipeline has no stages")]
    EmptyPipeline,

    #[error("job descriptor error: {0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("{0}")]
    Process(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PipelineError {
    /// Wrap an arbitrary processing failure.
    pub fn process(msg: impl Into<String>) -> Self {
        PipelineError::Process(msg.into().into())
    }
}
