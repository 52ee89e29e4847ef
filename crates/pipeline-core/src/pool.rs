//! Worker-pool stage runtime: one shared queue, N worker threads racing to
//! dequeue, each bound to its own processor (and through it, its own
//! external backend).

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::worker::{LiveWorkers, ShutdownTrigger, shutdown_pair, worker_loop};
use crate::{Job, PipelineError, Processor, Stage};

/// A stage backed by one shared queue and multiple competing worker threads.
///
/// Whichever worker is free first wins the next pending job; delivery is
/// exactly-once but arrival order is not preserved across workers, so a pool
/// is a genuine reordering point in a chain. One processor is supplied per
/// worker; each carries the identity of the backend it drives.
pub struct PoolStage {
    name: String,
    tx: Sender<Arc<Job>>,
    rx: Mutex<Option<Receiver<Arc<Job>>>>,
    processors: Mutex<Vec<Box<dyn Processor + Send>>>,
    next: Mutex<Option<Arc<dyn Stage>>>,
    shutdown: Mutex<Option<ShutdownTrigger>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    live: Arc<LiveWorkers>,
}

impl PoolStage {
    pub fn new(name: impl Into<String>, processors: Vec<Box<dyn Processor + Send>>) -> Arc<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Arc::new(Self {
            name: name.into(),
            tx,
            rx: Mutex::new(Some(rx)),
            processors: Mutex::new(processors),
            next: Mutex::new(None),
            shutdown: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            live: Arc::new(LiveWorkers::default()),
        })
    }
}

impl Stage for PoolStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_next(&self, next: Arc<dyn Stage>) -> Arc<dyn Stage> {
        // One shared forwarding target for every worker in the pool.
        *self.next.lock() = Some(Arc::clone(&next));
        next
    }

    fn start(&self) {
        if let Some(next) = self.next.lock().clone() {
            next.start();
        }

        let processors = std::mem::take(&mut *self.processors.lock());
        let Some(rx) = self.rx.lock().take() else {
            warn!(stage = %self.name, "stage already started");
            return;
        };
        if processors.is_empty() {
            warn!(stage = %self.name, "pool stage has no workers");
            return;
        }

        let (trigger, signal) = shutdown_pair();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(processors.len());
        let next = self.next.lock().clone();
        let mut handles = self.handles.lock();

        for processor in processors {
            let stage = self.name.clone();
            let worker = processor.name().to_owned();
            let spawned = std::thread::Builder::new()
                .name(format!("stage-{}-{worker}", self.name))
                .spawn({
                    let rx = rx.clone();
                    let signal = signal.clone();
                    let next = next.clone();
                    let live = Arc::clone(&self.live);
                    let ready_tx = ready_tx.clone();
                    move || worker_loop(stage, processor, rx, signal, next, live, ready_tx)
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    error!(stage = %self.name, worker = %worker, error = %err, "failed to spawn worker")
                }
            }
        }

        *self.shutdown.lock() = Some(trigger);
        drop(ready_tx);
        for _ in 0..handles.len() {
            let _ = ready_rx.recv();
        }
    }

    fn stop(&self) {
        // Wake every worker, then wait for each to finish its in-flight job.
        drop(self.shutdown.lock().take());
        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                error!(stage = %self.name, "worker thread panicked");
            }
        }

        if let Some(next) = self.next.lock().clone() {
            next.stop();
        }
    }

    fn enqueue(&self, job: Arc<Job>) -> Result<(), PipelineError> {
        debug!(stage = %self.name, job_id = job.id(), "queueing job");
        self.tx
            .send(job)
            .map_err(|_| PipelineError::QueueClosed("pool workers have exited"))
    }

    fn is_running(&self) -> bool {
        self.live.any()
    }
}
