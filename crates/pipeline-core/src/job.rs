//! Job data object and its status state machine.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;

/// Processing state of a [`Job`].
///
/// Transitions are applied by whichever stage currently holds the job: a
/// worker sets `Running` on dequeue, `Error` on a failed process step,
/// `Completed` on a successful process step at a terminal stage, and leaves
/// `Running` untouched when the job is about to be handed to a next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Created, not yet picked up by any worker.
    Stopped,
    /// Currently held by a worker or in transit between stages.
    Running,
    /// Finished successfully at a terminal stage.
    Completed,
    /// The most recent stage to touch the job failed on it.
    Error,
}

/// A unit of work flowing through the pipeline.
///
/// Identity fields (`id`, `input`, `fps`, `descriptor`) are fixed at
/// creation; only `status` mutates, guarded by a lock scoped to this
/// instance. Jobs are shared as `Arc<Job>` and owned by at most one stage
/// queue or worker at a time.
#[derive(Debug)]
pub struct Job {
    /// Sequential identification assigned by the producer.
    id: u64,
    /// Directory with the input to process.
    input: PathBuf,
    /// Frame rate of the input sequence.
    fps: u32,
    /// Raw job description as read from the descriptor file.
    descriptor: Value,
    status: Mutex<JobStatus>,
}

impl Job {
    pub fn new(id: u64, input: PathBuf, fps: u32, descriptor: Value) -> Self {
        Self {
            id,
            input,
            fps,
            descriptor,
            status: Mutex::new(JobStatus::Stopped),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn descriptor(&self) -> &Value {
        &self.descriptor
    }

    pub fn status(&self) -> JobStatus {
        *self.status.lock()
    }

    pub(crate) fn set_status(&self, status: JobStatus) {
        *self.status.lock() = status;
    }
}
