//! Single-slot hand-off from the listener to the host UI thread.
//!
//! ```text
//! Idle ──submit──► Queued ──run_pending──► Running ──► Idle
//!                    │
//!                    └── withdraw (timeout, stop) ──► Idle
//! ```
//!
//! At most one job is queued or running. A second submission is refused
//! with [`QueueError::Busy`], never overwriting the first.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::host::{HostError, UiDispatcher};
use crate::result::{BUSY, ExecutionResult};
use crate::script::ScriptFile;
use crate::server::CancelToken;
use crate::transport::{Endpoint, Request};

pub type JobId = Uuid;

/// Errors from [`ExecutionQueue::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("{}", BUSY)]
    Busy,

    /// The UI thread refused the callback.
    #[error(transparent)]
    Dispatch(#[from] HostError),
}

/// One submission, owned by the queue from deposit to completion.
#[derive(Debug)]
pub struct ExecutionJob {
    pub id: JobId,
    pub files: Vec<ScriptFile>,
    pub entry: Option<String>,
    /// Where printed lines are streamed, if the client asked for it.
    pub output: Option<Endpoint>,
    pub submitted_at: Instant,
}

impl ExecutionJob {
    pub fn new(request: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            files: request.files,
            entry: request.entry,
            output: request.output.map(Endpoint::new),
            submitted_at: Instant::now(),
        }
    }
}

/// Runs a job to completion. Called on the UI thread.
pub trait JobRunner: Send + Sync {
    fn run(&self, job: ExecutionJob) -> ExecutionResult;
}

impl<F> JobRunner for F
where
    F: Fn(ExecutionJob) -> ExecutionResult + Send + Sync,
{
    fn run(&self, job: ExecutionJob) -> ExecutionResult {
        self(job)
    }
}

/// Observable state of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Queued(JobId),
    Running(JobId),
}

/// How waiting for a job ended.
#[derive(Debug)]
pub enum Completion {
    Finished(ExecutionResult),
    TimedOut,
    Cancelled,
}

/// Handle for the result of a submitted job.
#[derive(Debug)]
pub struct Ticket {
    id: JobId,
    receiver: oneshot::Receiver<ExecutionResult>,
}

impl Ticket {
    pub fn id(&self) -> JobId {
        self.id
    }
}

enum Slot {
    Idle,
    Queued {
        job: ExecutionJob,
        reply: oneshot::Sender<ExecutionResult>,
    },
    Running(JobId),
}

impl Slot {
    fn state(&self) -> JobState {
        match self {
            Slot::Idle => JobState::Idle,
            Slot::Queued { job, .. } => JobState::Queued(job.id),
            Slot::Running(id) => JobState::Running(*id),
        }
    }
}

pub struct ExecutionQueue {
    slot: Mutex<Slot>,
    dispatcher: Arc<dyn UiDispatcher>,
    runner: Arc<dyn JobRunner>,
}

impl ExecutionQueue {
    pub fn new(dispatcher: Arc<dyn UiDispatcher>, runner: Arc<dyn JobRunner>) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::Idle),
            dispatcher,
            runner,
        })
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> JobState {
        self.slot().state()
    }

    /// Deposit `job` and ask the UI thread to run it.
    pub fn submit(self: &Arc<Self>, job: ExecutionJob) -> Result<Ticket, QueueError> {
        let id = job.id;
        let (reply, receiver) = oneshot::channel();
        {
            let mut slot = self.slot();
            if !matches!(*slot, Slot::Idle) {
                tracing::debug!(job = %id, state = ?slot.state(), "refusing job, slot occupied");
                return Err(QueueError::Busy);
            }
            *slot = Slot::Queued { job, reply };
        }

        let queue = Arc::clone(self);
        if let Err(err) = self
            .dispatcher
            .run_on_ui_thread(Box::new(move || queue.run_pending()))
        {
            tracing::error!(job = %id, error = %err, "failed to post job to UI thread");
            self.withdraw(id);
            return Err(QueueError::Dispatch(err));
        }

        tracing::debug!(job = %id, "job queued");
        Ok(Ticket { id, receiver })
    }

    /// Take the queued job, run it and publish its result. Runs on the UI
    /// thread; does nothing if the job was withdrawn.
    pub fn run_pending(&self) {
        let (job, reply) = {
            let mut slot = self.slot();
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Queued { job, reply } => {
                    *slot = Slot::Running(job.id);
                    (job, reply)
                }
                other => {
                    *slot = other;
                    return;
                }
            }
        };

        let id = job.id;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.runner.run(job)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(job = %id, %message, "job runner panicked");
                ExecutionResult::runtime_error(&message, Vec::new())
            });

        {
            let mut slot = self.slot();
            if matches!(*slot, Slot::Running(running) if running == id) {
                *slot = Slot::Idle;
            }
        }

        if reply.send(result).is_err() {
            tracing::warn!(job = %id, "discarding result of job nobody waits for");
        }
    }

    /// Remove `id` if it is still queued. Returns whether it was.
    pub fn withdraw(&self, id: JobId) -> bool {
        let mut slot = self.slot();
        if matches!(&*slot, Slot::Queued { job, .. } if job.id == id) {
            *slot = Slot::Idle;
            tracing::debug!(job = %id, "job withdrawn before it ran");
            return true;
        }
        false
    }

    /// Wait for the ticket's result, at most `timeout`.
    ///
    /// On timeout or cancellation a still-queued job is withdrawn so it never
    /// runs. A job already running finishes and its result is dropped.
    pub async fn await_completion(
        &self,
        ticket: Ticket,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Completion {
        let Ticket { id, receiver } = ticket;
        tokio::select! {
            received = tokio::time::timeout(timeout, receiver) => match received {
                Ok(Ok(result)) => Completion::Finished(result),
                Ok(Err(_)) => Completion::Finished(ExecutionResult::rejected(
                    "The host dropped the job without a result",
                )),
                Err(_) => {
                    let withdrawn = self.withdraw(id);
                    tracing::warn!(job = %id, ?timeout, withdrawn, "job timed out");
                    Completion::TimedOut
                }
            },
            _ = cancel.cancelled() => {
                self.withdraw(id);
                Completion::Cancelled
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
