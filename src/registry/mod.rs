//! In-memory task registry
//!
//! The registry is the authoritative copy of every task. Each task lives in
//! its own [`TaskEntry`] behind an `Arc`, so workers can mutate a single file
//! without holding the map lock. The map lock only guards membership.
//!
//! Every mutation is written through to the [`TaskStore`]; writes for the
//! same task are serialized so the record on disk always reflects the most
//! recent in-memory state.

mod progress;
mod recovery;

pub use progress::{aggregate, compute_progress, derive_status};

use crate::error::{Error, Result};
use crate::store::TaskStore;
use crate::types::{Task, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a live task
pub type SharedTask = Arc<TaskEntry>;

/// A live task plus the lock that orders its persistence
#[derive(Debug)]
pub struct TaskEntry {
    task: RwLock<Task>,
    persist_lock: Mutex<()>,
}

impl TaskEntry {
    fn new(task: Task) -> Self {
        Self {
            task: RwLock::new(task),
            persist_lock: Mutex::new(()),
        }
    }

    /// Shared read access. Never hold across network I/O.
    pub async fn read(&self) -> RwLockReadGuard<'_, Task> {
        self.task.read().await
    }

    /// Exclusive write access. Never hold across network I/O.
    pub async fn write(&self) -> RwLockWriteGuard<'_, Task> {
        self.task.write().await
    }

    /// Owned copy of the current state
    pub async fn snapshot(&self) -> Task {
        self.task.read().await.clone()
    }
}

/// Task map backed by a [`TaskStore`]
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, SharedTask>>,
    store: TaskStore,
}

impl TaskRegistry {
    /// Empty registry writing through to `store`
    pub fn new(store: TaskStore) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Registry populated with every readable record in `store`
    pub async fn load(store: TaskStore) -> Result<Self> {
        let records = store.load_all().await?;
        tracing::info!(
            count = records.len(),
            state_dir = %store.state_dir().display(),
            "Loaded tasks from store"
        );

        let tasks = records
            .into_iter()
            .map(|(id, task)| (id, Arc::new(TaskEntry::new(task))))
            .collect();

        Ok(Self {
            tasks: RwLock::new(tasks),
            store,
        })
    }

    /// The backing store
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Create, persist and register a task with one pending file per URL.
    ///
    /// The task becomes visible only after it has been saved; if saving
    /// fails the error is returned and nothing is registered.
    pub async fn create_task(&self, urls: Vec<String>) -> Result<Task> {
        let task = Task::new(TaskId::generate(), urls);

        self.store.save(&task).await?;

        self.tasks
            .write()
            .await
            .insert(task.id.clone(), Arc::new(TaskEntry::new(task.clone())));

        tracing::info!(task_id = %task.id, files = task.files.len(), "Task created");
        Ok(task)
    }

    /// Shared handle to a task, `None` when unknown
    pub async fn get_task(&self, id: &TaskId) -> Option<SharedTask> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Owned copy of a task, `None` when unknown
    pub async fn task_snapshot(&self, id: &TaskId) -> Option<Task> {
        let entry = self.get_task(id).await?;
        Some(entry.snapshot().await)
    }

    /// Replace a task's contents and persist it.
    ///
    /// An existing entry is overwritten in place so handles held by workers
    /// stay valid. The in-memory update is kept even when persisting fails.
    pub async fn update_task(&self, task: Task) -> Result<()> {
        let entry = {
            let mut tasks = self.tasks.write().await;
            match tasks.get(&task.id) {
                Some(entry) => Arc::clone(entry),
                None => {
                    let entry = Arc::new(TaskEntry::new(task.clone()));
                    tasks.insert(task.id.clone(), Arc::clone(&entry));
                    entry
                }
            }
        };

        let _persist = entry.persist_lock.lock().await;
        *entry.write().await = task.clone();
        self.store.update(&task).await
    }

    /// Save the current state of a task
    pub async fn persist_task(&self, id: &TaskId) -> Result<()> {
        let entry = self
            .get_task(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.persist_entry(&entry).await
    }

    pub(crate) async fn persist_entry(&self, entry: &TaskEntry) -> Result<()> {
        let _persist = entry.persist_lock.lock().await;
        let snapshot = entry.snapshot().await;
        self.store.save(&snapshot).await
    }

    /// Copy of the map; values share state with the live tasks
    pub async fn all_tasks(&self) -> HashMap<TaskId, SharedTask> {
        self.tasks.read().await.clone()
    }

    /// Owned copies of all tasks, oldest first
    pub async fn all_snapshots(&self) -> Vec<Task> {
        let entries: Vec<SharedTask> = self.tasks.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshots.push(entry.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    /// Owned copies of tasks that are pending or downloading
    pub async fn incomplete_tasks(&self) -> Vec<Task> {
        self.all_snapshots()
            .await
            .into_iter()
            .filter(|task| task.status.is_incomplete())
            .collect()
    }

    /// Recompute progress and status of a task from its files, then persist.
    ///
    /// Persistence failures are logged and not returned.
    pub async fn refresh_progress(&self, id: &TaskId) {
        let Some(entry) = self.get_task(id).await else {
            tracing::warn!(task_id = %id, "Cannot refresh progress of unknown task");
            return;
        };

        {
            let mut task = entry.write().await;
            aggregate(&mut task);
            tracing::debug!(
                task_id = %id,
                progress = task.progress,
                status = %task.status,
                "Task progress updated"
            );
        }

        if let Err(e) = self.persist_entry(&entry).await {
            tracing::error!(task_id = %id, error = %e, "Failed to persist task progress");
        }
    }

    /// Number of registered tasks
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// True when no task is registered
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
