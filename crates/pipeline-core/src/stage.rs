//! The stage contract and the shared job dispatch sequence.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{Job, JobStatus, PipelineError, Processor};

/// A step within a job processing pipeline.
///
/// Stages are linked into a chain with [`set_next`](Stage::set_next) during
/// assembly, before anything starts; the forwarding target is treated as
/// immutable once workers are running. Lifecycle cascades through the chain:
/// `start()` brings the tail up first so no stage ever produces into a
/// consumer that is not yet running, and `stop()` tears down head-first so
/// producers stop before their consumers, letting in-flight jobs finish
/// their trip through the remaining chain.
pub trait Stage: Send + Sync {
    /// Name of the stage, used for logging.
    fn name(&self) -> &str;

    /// Set the following stage in the chain.
    ///
    /// Returns the stage it was given so chains can be built fluently:
    /// `a.set_next(b).set_next(c)`. Must be called before [`start`](Stage::start);
    /// not safe to call while workers are running.
    fn set_next(&self, next: Arc<dyn Stage>) -> Arc<dyn Stage>;

    /// Start the rest of the chain, then this stage's worker thread(s).
    ///
    /// Returns once every worker spawned by this stage has entered its
    /// service loop.
    fn start(&self);

    /// Cancel this stage's worker thread(s), wait for them to terminate,
    /// then stop the rest of the chain. A worker mid-job is never aborted;
    /// its current process-and-forward step always finishes first.
    fn stop(&self);

    /// Add a job to the tail of this stage's queue and wake a waiting
    /// worker. Unbounded; only fails once the stage's workers have exited.
    fn enqueue(&self, job: Arc<Job>) -> Result<(), PipelineError>;

    /// True while at least one of this stage's worker threads is inside its
    /// service loop.
    fn is_running(&self) -> bool;
}

/// Run one dequeued job through a stage: mark it running, apply the
/// processor with fault isolation, then hand it on.
pub(crate) fn process_and_forward(
    stage: &str,
    processor: &mut dyn Processor,
    job: Arc<Job>,
    next: Option<&Arc<dyn Stage>>,
) {
    job.set_status(JobStatus::Running);
    debug!(stage, worker = processor.name(), job_id = job.id(), "processing job");

    let succeeded = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(&job))) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(stage, job_id = job.id(), error = %err, "job processing failed");
            false
        }
        Err(_) => {
            error!(stage, job_id = job.id(), "processor panicked; job marked failed");
            false
        }
    };

    forward(stage, job, succeeded, next);
}

/// Record the outcome of a stage's process step and forward the job.
///
/// Forwarding happens regardless of success or failure; a failed job still
/// travels the rest of the chain, and the next stage overwrites its status
/// on dequeue. A fault while enqueueing into the next stage marks the job
/// failed and drops it (no retry).
pub(crate) fn forward(stage: &str, job: Arc<Job>, succeeded: bool, next: Option<&Arc<dyn Stage>>) {
    if !succeeded {
        job.set_status(JobStatus::Error);
    } else if next.is_none() {
        job.set_status(JobStatus::Completed);
    }
    debug!(stage, job_id = job.id(), status = ?job.status(), "processed job");

    let Some(next) = next else { return };
    match panic::catch_unwind(AssertUnwindSafe(|| next.enqueue(Arc::clone(&job)))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(stage, job_id = job.id(), error = %err, "failed to forward job");
            job.set_status(JobStatus::Error);
        }
        Err(_) => {
            error!(stage, job_id = job.id(), "next stage panicked on enqueue");
            job.set_status(JobStatus::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CollectingStage, FailOn, ScriptedProcessor};
    use serde_json::Value;
    use std::path::PathBuf;

    fn job(id: u64) -> Arc<Job> {
        Arc::new(Job::new(id, PathBuf::from(format!("/in/{id}")), 25, Value::Null))
    }

    #[test]
    fn success_at_terminal_completes() {
        let mut processor = ScriptedProcessor::new("ok", FailOn::Never);
        let job = job(1);
        process_and_forward("test", &mut processor, Arc::clone(&job), None);
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(processor.seen(), vec![1]);
    }

    #[test]
    fn success_with_next_leaves_running_and_forwards() {
        let next = CollectingStage::new("next");
        let next_dyn: Arc<dyn Stage> = next.clone();
        let mut processor = ScriptedProcessor::new("ok", FailOn::Never);
        let job = job(2);
        process_and_forward("test", &mut processor, Arc::clone(&job), Some(&next_dyn));
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(next.received(), vec![2]);
    }

    #[test]
    fn failure_marks_error_but_still_forwards() {
        let next = CollectingStage::new("next");
        let next_dyn: Arc<dyn Stage> = next.clone();
        let mut processor = ScriptedProcessor::new("bad", FailOn::Always);
        let job = job(3);
        process_and_forward("test", &mut processor, Arc::clone(&job), Some(&next_dyn));
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(next.received(), vec![3]);
    }

    #[test]
    fn processor_panic_is_contained() {
        let mut processor = ScriptedProcessor::new("panicky", FailOn::Panic);
        let job = job(4);
        process_and_forward("test", &mut processor, Arc::clone(&job), None);
        assert_eq!(job.status(), JobStatus::Error);
    }

    #[test]
    fn forward_failure_marks_error() {
        let next = CollectingStage::rejecting("closed");
        let next_dyn: Arc<dyn Stage> = next.clone();
        let mut processor = ScriptedProcessor::new("ok", FailOn::Never);
        let job = job(5);
        process_and_forward("test", &mut processor, Arc::clone(&job), Some(&next_dyn));
        assert_eq!(job.status(), JobStatus::Error);
        assert!(next.received().is_empty());
    }
}
