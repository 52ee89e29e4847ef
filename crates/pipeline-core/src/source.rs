//! Source stage runtime: the head of a chain. Instead of draining a queue it
//! polls a [`Source`] collaborator for newly ready jobs and feeds them into
//! the rest of the pipeline.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::select;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::stage::forward;
use crate::worker::{LiveWorkers, ShutdownSignal, ShutdownTrigger, shutdown_pair};
use crate::{Job, JobStatus, PipelineError, Source, Stage};

/// First-stage runtime that creates jobs rather than consuming them.
///
/// The worker asks the source for new work; when nothing is ready it waits
/// one poll interval (interruptible by `stop()`) and asks again. A produced
/// job is marked running and handed straight to the next stage.
pub struct SourceStage {
    name: String,
    source: Mutex<Option<Box<dyn Source + Send>>>,
    poll_interval: Duration,
    next: Mutex<Option<Arc<dyn Stage>>>,
    shutdown: Mutex<Option<ShutdownTrigger>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    live: Arc<LiveWorkers>,
}

impl SourceStage {
    pub fn new(
        name: impl Into<String>,
        source: impl Source + 'static,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            source: Mutex::new(Some(Box::new(source))),
            poll_interval,
            next: Mutex::new(None),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
            live: Arc::new(LiveWorkers::default()),
        })
    }
}

fn source_loop(
    stage: String,
    mut source: Box<dyn Source + Send>,
    poll_interval: Duration,
    shutdown: ShutdownSignal,
    next: Option<Arc<dyn Stage>>,
    live: Arc<LiveWorkers>,
    ready: crossbeam_channel::Sender<()>,
) {
    live.enter();
    debug!(stage = %stage, source = source.name(), "worker started");
    let _ = ready.send(());

    while !shutdown.is_cancelled() {
        match source.poll() {
            Ok(Some(job)) => {
                let job = Arc::new(job);
                debug!(stage = %stage, job_id = job.id(), "job created");
                job.set_status(JobStatus::Running);
                forward(&stage, job, true, next.as_ref());
            }
            Ok(None) => {
                if pause(&shutdown, poll_interval) {
                    break;
                }
            }
            Err(err) => {
                warn!(stage = %stage, error = %err, "source poll failed");
                if pause(&shutdown, poll_interval) {
                    break;
                }
            }
        }
    }

    live.exit();
    debug!(stage = %stage, source = source.name(), "worker stopped");
}

/// Wait out one poll interval; returns true if cancelled in the meantime.
fn pause(shutdown: &ShutdownSignal, interval: Duration) -> bool {
    select! {
        recv(shutdown.receiver()) -> _ => true,
        default(interval) => false,
    }
}

impl Stage for SourceStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_next(&self, next: Arc<dyn Stage>) -> Arc<dyn Stage> {
        *self.next.lock() = Some(Arc::clone(&next));
        next
    }

    fn start(&self) {
        if let Some(next) = self.next.lock().clone() {
            next.start();
        }

        let Some(source) = self.source.lock().take() else {
            warn!(stage = %self.name, "stage already started");
            return;
        };

        let (trigger, signal) = shutdown_pair();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let stage = self.name.clone();
        let poll_interval = self.poll_interval;
        let next = self.next.lock().clone();
        let live = Arc::clone(&self.live);

        let spawned = std::thread::Builder::new()
            .name(format!("stage-{}", self.name))
            .spawn(move || source_loop(stage, source, poll_interval, signal, next, live, ready_tx));

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
        drop(self.shutdown.lock().take());
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            error!(stage = %self.name, "worker thread panicked");
        }

        if let Some(next) = self.next.lock().clone() {
            next.stop();
        }
    }

    fn enqueue(&self, job: Arc<Job>) -> Result<(), PipelineError> {
        warn!(stage = %self.name, job_id = job.id(), "enqueue rejected by source stage");
        Err(PipelineError::SourceEnqueue)
    }

    fn is_running(&self) -> bool {
        self.live.any()
    }
}
