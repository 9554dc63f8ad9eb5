//! Single-slot job tracking
//!
//! Jobs run one at a time, in start order, on a single worker task fed by
//! an unbounded channel. A job takes the "current job" slot when it begins
//! running, so the previous job's outcome stays readable until then.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use fleetman_api::JobStatus;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::AgentError;

/// Snapshot of a job
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub kind: String,
    pub status: JobStatus,
    pub error: Option<String>,
}

type Slot = Arc<Mutex<Option<Job>>>;

struct Queued {
    id: String,
    kind: String,
    action: BoxFuture<'static, Result<(), AgentError>>,
    done: oneshot::Sender<Job>,
}

#[derive(Default)]
struct Shared {
    current: Slot,
    queue: OnceLock<mpsc::UnboundedSender<Queued>>,
}

/// Tracks the current job. Clones share the same slot and worker.
///
/// The worker is spawned on the first `start_job` and exits once every
/// clone is dropped and the queue is drained.
#[derive(Clone, Default)]
pub struct JobManager {
    shared: Arc<Shared>,
}

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Job>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_jobs(slot: Slot, mut queue: mpsc::UnboundedReceiver<Queued>) {
    while let Some(Queued {
        id,
        kind,
        action,
        done,
    }) = queue.recv().await
    {
        let previous = lock(&slot).replace(Job {
            id: id.clone(),
            kind: kind.clone(),
            status: JobStatus::Running,
            error: None,
        });
        if let Some(previous) = previous {
            debug!(previous = %previous.id, status = %previous.status, job_id = %id, "job slot handed over");
        }
        info!(job_id = %id, kind = %kind, "job started");

        let outcome = match AssertUnwindSafe(action).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Panicked),
        };

        let finished = {
            let mut current = lock(&slot);
            let Some(job) = current.as_mut() else {
                continue;
            };
            match &outcome {
                Ok(()) => {
                    info!(job_id = %id, kind = %kind, "job succeeded");
                    job.status = JobStatus::Success;
                }
                Err(e) => {
                    warn!(job_id = %id, kind = %kind, error = %e, "job failed");
                    job.status = JobStatus::Error;
                    job.error = Some(e.to_string());
                }
            }
            job.clone()
        };
        // nobody waiting is fine
        let _ = done.send(finished);
    }
    debug!("job worker stopped");
}

impl JobManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> &mpsc::UnboundedSender<Queued> {
        self.shared.queue.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_jobs(self.shared.current.clone(), rx));
            tx
        })
    }

    /// Queue `action` behind every job started before it
    ///
    /// Returns immediately. The receiver yields the job's final snapshot
    /// once its outcome is recorded; awaiting it is optional.
    pub fn start_job<F>(
        &self,
        id: impl Into<String>,
        kind: impl Into<String>,
        action: F,
    ) -> oneshot::Receiver<Job>
    where
        F: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        let (done, finished) = oneshot::channel();
        let queued = Queued {
            id: id.into(),
            kind: kind.into(),
            action: action.boxed(),
            done,
        };
        if let Err(mpsc::error::SendError(job)) = self.queue().send(queued) {
            warn!(job_id = %job.id, "job worker is gone, job dropped");
        }
        finished
    }

    /// Copy of the current job
    #[must_use]
    pub fn get_current_job(&self) -> Option<Job> {
        lock(&self.shared.current).clone()
    }
}
