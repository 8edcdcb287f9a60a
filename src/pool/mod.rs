//! Bounded worker pool
//!
//! A fixed number of workers drain one bounded FIFO queue of
//! [`DownloadUnit`]s. What happens when the queue is full is decided by the
//! configured [`AdmissionPolicy`].
//!
//! The queue and its cancellation token form a generation: [`WorkerPool::stop`]
//! cancels the token and closes the queue, and a later [`WorkerPool::start`]
//! opens a fresh generation.

mod worker;

use crate::client::FileFetcher;
use crate::config::AdmissionPolicy;
use crate::error::{Error, Result};
use crate::registry::{SharedTask, TaskRegistry};
use crate::types::{Status, TaskId};
use std::sync::{Arc, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// One file of one task, as handed to a worker
#[derive(Debug, Clone)]
pub struct DownloadUnit {
    /// Owning task
    pub task_id: TaskId,
    /// Live handle to the owning task
    pub task: SharedTask,
    /// Position of the file within the task
    pub index: usize,
    /// Source URL of the file
    pub url: String,
}

/// Outcome of a single submission that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Accepted into the queue
    Queued,
    /// Queue was full and the unit was discarded
    Dropped,
    /// Pool is stopped; the unit was not accepted
    Refused,
}

/// Tally of a batch submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Units accepted into the queue
    pub queued: usize,
    /// Units discarded because the queue was full
    pub dropped: usize,
    /// Units not accepted because the pool is stopped
    pub refused: usize,
}

impl SubmitReport {
    fn record(&mut self, submission: Submission) {
        match submission {
            Submission::Queued => self.queued += 1,
            Submission::Dropped => self.dropped += 1,
            Submission::Refused => self.refused += 1,
        }
    }

    fn merge(&mut self, other: SubmitReport) {
        self.queued += other.queued;
        self.dropped += other.dropped;
        self.refused += other.refused;
    }
}

/// Queue plus cancellation token of one pool generation
struct QueueChannel {
    sender: Option<mpsc::Sender<DownloadUnit>>,
    receiver: Arc<Mutex<mpsc::Receiver<DownloadUnit>>>,
    cancel: CancellationToken,
}

impl QueueChannel {
    fn open(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender: Some(sender),
            receiver: Arc::new(Mutex::new(receiver)),
            cancel: CancellationToken::new(),
        }
    }
}

/// Fixed-size pool of download workers
pub struct WorkerPool {
    workers: usize,
    capacity: usize,
    admission: AdmissionPolicy,
    registry: Arc<TaskRegistry>,
    fetcher: Arc<dyn FileFetcher>,
    channel: std::sync::Mutex<QueueChannel>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("capacity", &self.capacity)
            .field("admission", &self.admission)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Create a stopped pool. Units may be submitted before [`start`](Self::start).
    pub fn new(
        workers: usize,
        capacity: usize,
        admission: AdmissionPolicy,
        registry: Arc<TaskRegistry>,
        fetcher: Arc<dyn FileFetcher>,
    ) -> Self {
        Self {
            workers,
            capacity,
            admission,
            registry,
            fetcher,
            channel: std::sync::Mutex::new(QueueChannel::open(capacity)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Number of workers spawned by [`start`](Self::start)
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Queue capacity in units
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn channel(&self) -> MutexGuard<'_, QueueChannel> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the workers.
    ///
    /// Opens a fresh queue and cancellation token if the pool was stopped.
    /// Calling `start` on a running pool does nothing.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            tracing::warn!("Worker pool already running");
            return;
        }

        let (receiver, cancel) = {
            let mut channel = self.channel();
            if channel.cancel.is_cancelled() || channel.sender.is_none() {
                *channel = QueueChannel::open(self.capacity);
            }
            (Arc::clone(&channel.receiver), channel.cancel.clone())
        };

        tracing::info!(count = self.workers, capacity = self.capacity, "Starting workers");

        for worker_id in 0..self.workers {
            let span = tracing::info_span!("worker", worker_id);
            let handle = tokio::spawn(
                worker::run(
                    worker_id,
                    Arc::clone(&receiver),
                    cancel.clone(),
                    Arc::clone(&self.registry),
                    Arc::clone(&self.fetcher),
                )
                .instrument(span),
            );
            handles.push(handle);
        }
    }

    /// Cancel the workers, close the queue and wait for every worker to exit.
    ///
    /// Safe to call without `start`, repeatedly, and concurrently; every
    /// caller returns only once all workers have exited. A unit already being
    /// processed is finished first.
    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;

        {
            let mut channel = self.channel();
            channel.cancel.cancel();
            channel.sender.take();
        }

        if handles.is_empty() {
            return;
        }

        tracing::info!("Stopping workers");
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        tracing::info!("All workers stopped");
    }

    /// True while workers are spawned
    pub async fn is_running(&self) -> bool {
        !self.handles.lock().await.is_empty()
    }

    /// Offer a unit to the queue.
    ///
    /// A stopped pool refuses without error. A full queue is handled by the
    /// admission policy: `Drop` discards the unit, `Reject` fails with
    /// [`Error::QueueFull`], and `Block` waits up to its timeout for space
    /// before failing the same way.
    pub async fn submit(&self, unit: DownloadUnit) -> Result<Submission> {
        let (sender, cancel) = {
            let channel = self.channel();
            (channel.sender.clone(), channel.cancel.clone())
        };

        let sender = match sender {
            Some(sender) if !cancel.is_cancelled() => sender,
            _ => {
                tracing::warn!(
                    task_id = %unit.task_id,
                    file_index = unit.index,
                    "Worker pool stopped, cannot add file"
                );
                return Ok(Submission::Refused);
            }
        };

        let unit = match sender.try_send(unit) {
            Ok(()) => return Ok(Submission::Queued),
            Err(TrySendError::Closed(unit)) => {
                tracing::warn!(task_id = %unit.task_id, file_index = unit.index, "Work queue closed");
                return Ok(Submission::Refused);
            }
            Err(TrySendError::Full(unit)) => unit,
        };

        match self.admission {
            AdmissionPolicy::Drop => {
                tracing::warn!(
                    task_id = %unit.task_id,
                    file_index = unit.index,
                    url = %unit.url,
                    "Work queue full, dropping file"
                );
                Ok(Submission::Dropped)
            }
            AdmissionPolicy::Reject => Err(Error::QueueFull {
                capacity: self.capacity,
            }),
            AdmissionPolicy::Block { timeout } => {
                tokio::select! {
                    _ = cancel.cancelled() => Ok(Submission::Refused),
                    sent = tokio::time::timeout(timeout, sender.send(unit)) => match sent {
                        Ok(Ok(())) => Ok(Submission::Queued),
                        Ok(Err(_)) => Ok(Submission::Refused),
                        Err(_) => Err(Error::QueueFull {
                            capacity: self.capacity,
                        }),
                    },
                }
            }
        }
    }

    /// Submit the files at `indices` of a task.
    ///
    /// Out-of-range positions are skipped. Stops at the first submission
    /// error; files submitted before it stay queued.
    pub async fn process_files(&self, task_id: &TaskId, indices: &[usize]) -> Result<SubmitReport> {
        let task = self
            .registry
            .get_task(task_id)
            .await
            .ok_or_else(|| Error::NotFound(task_id.to_string()))?;

        tracing::info!(task_id = %task_id, files_count = indices.len(), "Processing files");

        let mut report = SubmitReport::default();
        for &index in indices {
            let url = match task.read().await.files.get(index) {
                Some(file) => file.url.clone(),
                None => {
                    tracing::warn!(task_id = %task_id, file_index = index, "No file at index, skipping");
                    continue;
                }
            };

            let unit = DownloadUnit {
                task_id: task_id.clone(),
                task: Arc::clone(&task),
                index,
                url,
            };
            report.record(self.submit(unit).await?);
        }

        Ok(report)
    }

    /// Submit every file of a task
    pub async fn process_task(&self, task_id: &TaskId) -> Result<SubmitReport> {
        let task = self
            .registry
            .get_task(task_id)
            .await
            .ok_or_else(|| Error::NotFound(task_id.to_string()))?;
        let count = task.read().await.files.len();
        let indices: Vec<usize> = (0..count).collect();
        self.process_files(task_id, &indices).await
    }

    /// Submit every file that is not completed, for each task in `ids`.
    ///
    /// Errors for one task are logged and do not stop the others.
    pub async fn resume_tasks(&self, ids: &[TaskId]) -> SubmitReport {
        let mut total = SubmitReport::default();

        for id in ids {
            let Some(task) = self.registry.get_task(id).await else {
                tracing::warn!(task_id = %id, "Cannot resume unknown task");
                continue;
            };

            let indices: Vec<usize> = task
                .read()
                .await
                .files
                .iter()
                .enumerate()
                .filter(|(_, f)| f.status != Status::Completed)
                .map(|(i, _)| i)
                .collect();

            match self.process_files(id, &indices).await {
                Ok(report) => total.merge(report),
                Err(e) => tracing::error!(task_id = %id, error = %e, "Failed to resume task"),
            }
        }

        tracing::info!(
            tasks = ids.len(),
            queued = total.queued,
            dropped = total.dropped,
            refused = total.refused,
            "Resubmitted recovered files"
        );
        total
    }
}
