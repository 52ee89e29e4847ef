//! Shared stubs for the engine's unit tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{Job, PipelineError, Processor, Stage};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Poll `cond` until it holds or the timeout elapses. Returns whether it held.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[derive(Clone, Copy)]
pub enum FailOn {
    Never,
    Always,
    Panic,
    /// Fail only the job with this id.
    Id(u64),
}

/// Processor that records the ids it sees and fails on demand.
pub struct ScriptedProcessor {
    name: &'static str,
    fail: FailOn,
    delay: Duration,
    seen: Arc<Mutex<Vec<u64>>>,
}

impl ScriptedProcessor {
    pub fn new(name: &'static str, fail: FailOn) -> Self {
        Self {
            name,
            fail,
            delay: Duration::ZERO,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Handle onto the recorded ids, valid after the processor moves into a stage.
    pub fn seen_handle(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.seen)
    }

    pub fn seen(&self) -> Vec<u64> {
        self.seen.lock().clone()
    }
}

impl Processor for ScriptedProcessor {
    fn name(&self) -> &str {
        self.name
    }

    fn process(&mut self, job: &Job) -> Result<(), PipelineError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.seen.lock().push(job.id());
        match self.fail {
            FailOn::Never => Ok(()),
            FailOn::Always => Err(PipelineError::process("scripted failure")),
            FailOn::Panic => panic!("scripted panic"),
            FailOn::Id(id) if id == job.id() => Err(PipelineError::process("scripted failure")),
            FailOn::Id(_) => Ok(()),
        }
    }
}

/// Stage stub that records enqueued jobs instead of running a worker.
pub struct CollectingStage {
    name: &'static str,
    reject: bool,
    jobs: Mutex<Vec<Arc<Job>>>,
}

impl CollectingStage {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reject: false,
            jobs: Mutex::new(Vec::new()),
        })
    }

    /// A stage whose `enqueue` always fails, for forwarding-fault tests.
    pub fn rejecting(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reject: true,
            jobs: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<u64> {
        self.jobs.lock().iter().map(|j| j.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl Stage for CollectingStage {
    fn name(&self) -> &str {
        self.name
    }

    fn set_next(&self, next: Arc<dyn Stage>) -> Arc<dyn Stage> {
        next
    }

    fn start(&self) {}

    fn stop(&self) {}

    fn enqueue(&self, job: Arc<Job>) -> Result<(), PipelineError> {
        if self.reject {
            return Err(PipelineError::QueueClosed("collecting stage rejects"));
        }
        self.jobs.lock().push(job);
        Ok(())
    }

    fn is_running(&self) -> bool {
        false
    }
}
