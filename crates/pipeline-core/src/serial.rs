//! Single-worker stage runtime: one dedicated queue, one worker thread,
//! strict arrival-order service.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::worker::{LiveWorkers, ShutdownTrigger, shutdown_pair, worker_loop};
use crate::{Job, PipelineError, Processor, Stage};

/// A stage backed by exactly one queue and one worker thread.
///
/// Jobs are serviced in the order they were enqueued. The processor is moved
/// into the worker thread at `start()`; the stage is one-shot and cannot be
/// restarted after `stop()`.
pub struct SerialStage {
    name: String,
    tx: Sender<Arc<Job>>,
    rx: Mutex<Option<Receiver<Arc<Job>>>>,
    processor: Mutex<Option<Box<dyn Processor + Send>>>,
    next: Mutex<Option<Arc<dyn Stage>>>,
    shutdown: Mutex<Option<ShutdownTrigger>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    live: Arc<LiveWorkers>,
}

impl SerialStage {
    pub fn new(name: impl Into<String>, processor: impl Processor + 'static) -> Arc<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Arc::new(Self {
            name: name.into(),
            tx,
            rx: Mutex::new(Some(rx)),
            processor: Mutex::new(Some(Box::new(processor))),
            next: Mutex::new(None),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
            live: Arc::new(LiveWorkers::default()),
        })
    }
}

impl Stage for SerialStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_next(&self, next: Arc<dyn Stage>) -> Arc<dyn Stage> {
        *self.next.lock() = Some(Arc::clone(&next));
        next
    }

    fn start(&self) {
        // Back to front, so the consumer is alive before we produce into it.
        if let Some(next) = self.next.lock().clone() {
            next.start();
        }

        let (Some(rx), Some(processor)) = (self.rx.lock().take(), self.processor.lock().take())
        else {
            warn!(stage = %self.name, "stage already started");
            return;
        };

        let (trigger, signal) = shutdown_pair();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let stage = self.name.clone();
        let next = self.next.lock().clone();
        let live = Arc::clone(&self.live);

        let spawned = std::thread::Builder::new()
            .name(format!("stage-{}", self.name))
            .spawn(move || worker_loop(stage, processor, rx, signal, next, live, ready_tx));

        match spawned {
            Ok(handle) => {
                *self.shutdown.lock() = Some(trigger);
                *self.handle.lock() = Some(handle);
                let _ = ready_rx.recv();
            }
            Err(err) => error!(stage = %self.name, error = %err, "failed to spawn worker"),
        }
    }

    fn stop(&self) {
        // Wakes the worker out of its queue wait; an in-flight job still
        // finishes its process-and-forward step before the join returns.
        drop(self.shutdown.lock().take());
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            error!(stage = %self.name, "worker thread panicked");
        }

        // Front to back, after our own worker has terminated.
        if let Some(next) = self.next.lock().clone() {
            next.stop();
        }
    }

    fn enqueue(&self, job: Arc<Job>) -> Result<(), PipelineError> {
        debug!(stage = %self.name, job_id = job.id(), "queueing job");
        self.tx
            .send(job)
            .map_err(|_| PipelineError::QueueClosed("stage worker has exited"))
    }

    fn is_running(&self) -> bool {
        self.live.any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobStatus;
    use crate::test_utils::{CollectingStage, FailOn, ScriptedProcessor, init_tracing, wait_until};
    use serde_json::Value;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    fn job(id: u64) -> Arc<Job> {
        Arc::new(Job::new(id, PathBuf::from(format!("/in/{id}")), 25, Value::Null))
    }

    #[test]
    fn services_jobs_in_fifo_order() {
        init_tracing();
        let processor = ScriptedProcessor::new("record", FailOn::Never);
        let seen = processor.seen_handle();
        let stage = SerialStage::new("fifo", processor);

        for id in 1..=5 {
            stage.enqueue(job(id)).unwrap();
        }
        stage.start();
        assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 5));
        stage.stop();

        assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn terminal_stage_completes_jobs() {
        init_tracing();
        let stage = SerialStage::new("terminal", ScriptedProcessor::new("ok", FailOn::Never));
        let j = job(1);
        stage.start();
        stage.enqueue(Arc::clone(&j)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            j.status() == JobStatus::Completed
        }));
        stage.stop();
    }

    #[test]
    fn bad_job_does_not_halt_the_worker() {
        init_tracing();
        let processor = ScriptedProcessor::new("flaky", FailOn::Id(2));
        let seen = processor.seen_handle();
        let stage = SerialStage::new("flaky", processor);
        stage.start();

        let failing = job(2);
        let trailing = job(3);
        stage.enqueue(Arc::clone(&failing)).unwrap();
        stage.enqueue(Arc::clone(&trailing)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 2));
        stage.stop();
        assert_eq!(failing.status(), JobStatus::Error);
        assert_eq!(trailing.status(), JobStatus::Completed);
    }

    #[test]
    fn panicking_job_is_isolated() {
        init_tracing();
        let processor = ScriptedProcessor::new("panicky", FailOn::Panic);
        let seen = processor.seen_handle();
        let stage = SerialStage::new("panicky", processor);
        stage.start();
        stage.enqueue(job(1)).unwrap();
        stage.enqueue(job(2)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 2));
        assert!(stage.is_running());
        stage.stop();
    }

    #[test]
    fn stop_waits_for_in_flight_job() {
        init_tracing();
        let processor =
            ScriptedProcessor::new("slow", FailOn::Never).with_delay(Duration::from_millis(200));
        let seen = processor.seen_handle();
        let stage = SerialStage::new("slow", processor);
        stage.start();

        let j = job(1);
        stage.enqueue(Arc::clone(&j)).unwrap();
        // Let the worker pick the job up before cancelling.
        std::thread::sleep(Duration::from_millis(50));

        let before = Instant::now();
        stage.stop();
        assert!(before.elapsed() >= Duration::from_millis(100));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(j.status(), JobStatus::Completed);
        assert!(!stage.is_running());
    }

    #[test]
    fn enqueue_after_stop_fails() {
        let stage = SerialStage::new("closed", ScriptedProcessor::new("ok", FailOn::Never));
        stage.start();
        stage.stop();
        assert!(matches!(
            stage.enqueue(job(1)),
            Err(PipelineError::QueueClosed(_))
        ));
    }

    #[test]
    fn forwards_to_next_stage() {
        init_tracing();
        let next = CollectingStage::new("sink");
        let stage = SerialStage::new("fwd", ScriptedProcessor::new("ok", FailOn::Never));
        stage.set_next(next.clone());
        stage.start();
        let j = job(7);
        stage.enqueue(Arc::clone(&j)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || next.len() == 1));
        stage.stop();
        // Hand-off leaves the status at Running for the next stage to claim.
        assert_eq!(j.status(), JobStatus::Running);
        assert_eq!(next.received(), vec![7]);
    }
}
