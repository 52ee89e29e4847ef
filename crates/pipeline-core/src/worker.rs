//! Worker-thread plumbing shared by the stage runtimes.
//!
//! A stage owns a [`ShutdownTrigger`] per worker group and hands each worker
//! a [`ShutdownSignal`]. Cancellation is cooperative: dropping the trigger
//! disconnects the signal channel, which wakes every worker blocked on the
//! job queue immediately (no polling interval). A worker mid-job finishes
//! its process-and-forward step before it notices.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, select};
use tracing::debug;

use crate::stage::process_and_forward;
use crate::{Job, Processor, Stage};

/// Held by the stage; dropping it cancels every associated worker.
pub(crate) struct ShutdownTrigger {
    _tx: Sender<()>,
}

/// Held by a worker; resolves once the stage drops its trigger.
#[derive(Clone)]
pub(crate) struct ShutdownSignal {
    rx: Receiver<()>,
}

pub(crate) fn shutdown_pair() -> (ShutdownTrigger, ShutdownSignal) {
    // Nothing is ever sent; only the disconnect carries meaning.
    let (tx, rx) = crossbeam_channel::bounded::<()>(0);
    (ShutdownTrigger { _tx: tx }, ShutdownSignal { rx })
}

impl ShutdownSignal {
    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Counts workers currently inside their service loop; backs
/// [`Stage::is_running`].
#[derive(Default)]
pub(crate) struct LiveWorkers(AtomicUsize);

impl LiveWorkers {
    pub(crate) fn enter(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn exit(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn any(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }
}

/// Service loop shared by the serial and pool stage runtimes.
///
/// Signals `ready` once the loop is entered so `start()` can return with the
/// worker observably alive, then blocks on the queue until either a job
/// arrives or the stage cancels. Per-job faults are contained inside
/// `process_and_forward`; nothing a job does exits this loop.
pub(crate) fn worker_loop(
    stage: String,
    mut processor: Box<dyn Processor + Send>,
    jobs: Receiver<Arc<Job>>,
    shutdown: ShutdownSignal,
    next: Option<Arc<dyn Stage>>,
    live: Arc<LiveWorkers>,
    ready: Sender<()>,
) {
    live.enter();
    debug!(stage = %stage, worker = processor.name(), "worker started");
    let _ = ready.send(());

    loop {
        if shutdown.is_cancelled() {
            break;
        }
        select! {
            recv(jobs) -> msg => match msg {
                Ok(job) => process_and_forward(&stage, processor.as_mut(), job, next.as_ref()),
                // Every sender dropped; no more work can ever arrive.
                Err(_) => break,
            },
            recv(shutdown.receiver()) -> _ => break,
        }
    }

    live.exit();
    debug!(stage = %stage, worker = processor.name(), "worker stopped");
}
