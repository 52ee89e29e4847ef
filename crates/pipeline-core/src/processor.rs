//! Collaborator traits: the pluggable work logic a stage runs on each job,
//! and the producer that feeds new jobs into the head of a chain.

use crate::{Job, PipelineError};

/// Stage-specific work applied to each job a worker dequeues.
///
/// Implementations may block for the duration of a job (e.g. on an external
/// process); each worker is independent, so blocking one worker does not
/// block the others. Both an `Err` return and a panic are contained by the
/// engine: the job is marked failed and the worker keeps servicing the
/// queue.
pub trait Processor: Send {
    /// Label used in logs; for pool workers this identifies the backend.
    fn name(&self) -> &str;

    fn process(&mut self, job: &Job) -> Result<(), PipelineError>;
}

/// Producer of new jobs for a [`SourceStage`](crate::SourceStage).
///
/// `poll` inspects some external readiness condition and returns a freshly
/// constructed job when one is ready, or `None` when there is nothing to do
/// yet (the stage waits one poll interval before asking again). Errors are
/// logged and retried on the same cadence.
pub trait Source: Send {
    fn name(&self) -> &str;

    fn poll(&mut self) -> Result<Option<Job>, PipelineError>;
}
