//! Download service facade
//!
//! [`FileDownloader`] owns the registry and the worker pool and is what the
//! API layer and the binary talk to. Startup and shutdown sequencing lives
//! in [`lifecycle`].

mod lifecycle;

use crate::client::{FileFetcher, HttpFetcher};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::{SubmitReport, WorkerPool};
use crate::registry::TaskRegistry;
use crate::store::TaskStore;
use crate::types::{Task, TaskId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Batch download service
///
/// Cheap to clone; clones share all state.
#[derive(Clone, Debug)]
pub struct FileDownloader {
    config: Arc<Config>,
    registry: Arc<TaskRegistry>,
    pool: Arc<WorkerPool>,
    accepting_new: Arc<AtomicBool>,
}

impl FileDownloader {
    /// Build the service with the HTTP fetcher.
    ///
    /// Creates the download directory and loads every stored task. Does not
    /// start the workers.
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.download)?;
        Self::with_fetcher(config, Arc::new(fetcher)).await
    }

    /// Build the service with a custom [`FileFetcher`]
    pub async fn with_fetcher(config: Config, fetcher: Arc<dyn FileFetcher>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download.download_dir).await?;

        let store = TaskStore::new(&config.persistence.state_dir);
        let registry = Arc::new(TaskRegistry::load(store).await?);

        let pool = Arc::new(WorkerPool::new(
            config.worker.count,
            config.worker.effective_queue_capacity(),
            config.worker.admission,
            Arc::clone(&registry),
            fetcher,
        ));

        tracing::info!(
            workers = config.worker.count,
            queue_capacity = config.worker.effective_queue_capacity(),
            download_dir = %config.download.download_dir.display(),
            state_dir = %config.persistence.state_dir.display(),
            "File downloader initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            pool,
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The task registry
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The worker pool
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// False once shutdown has begun
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    /// Create a task for `urls` and queue all of its files.
    ///
    /// # Errors
    ///
    /// [`Error::ShuttingDown`] once shutdown has begun, a store error when
    /// the task cannot be saved, or [`Error::QueueFull`] under the `reject`
    /// and `block` admission policies. In the last case the task exists and
    /// its unqueued files are picked up by the next recovery.
    pub async fn create_task(&self, urls: Vec<String>) -> Result<Task> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let task = self.registry.create_task(urls).await?;
        let report = self.pool.process_task(&task.id).await?;
        if report.dropped > 0 || report.refused > 0 {
            tracing::warn!(
                task_id = %task.id,
                queued = report.queued,
                dropped = report.dropped,
                refused = report.refused,
                "Not every file of the task was queued"
            );
        }
        Ok(task)
    }

    /// Current state of a task
    pub async fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.registry
            .task_snapshot(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// All tasks, oldest first
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.registry.all_snapshots().await
    }

    /// Reset unfinished tasks and queue their files again
    pub async fn recover(&self) -> SubmitReport {
        let ids = self.registry.recover_incomplete_tasks().await;
        self.pool.resume_tasks(&ids).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
