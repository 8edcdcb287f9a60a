//! Startup recovery of unfinished tasks

use super::TaskRegistry;
use crate::types::{Status, TaskId};

impl TaskRegistry {
    /// Reset unfinished tasks so they can be processed again.
    ///
    /// Every task that is pending, downloading or failed goes back to
    /// pending with zero progress, and each of its files that is not
    /// completed goes back to pending with nothing downloaded. Reset tasks
    /// are persisted; completed tasks are left alone and not rewritten.
    ///
    /// Returns the IDs of the reset tasks, oldest first.
    pub async fn recover_incomplete_tasks(&self) -> Vec<TaskId> {
        let mut entries: Vec<_> = self.all_tasks().await.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut recovered = Vec::new();
        for (id, entry) in entries {
            let reset = {
                let mut task = entry.write().await;
                if task.status == Status::Completed {
                    false
                } else {
                    task.status = Status::Pending;
                    task.progress = 0;
                    for file in task.files.iter_mut().filter(|f| f.status != Status::Completed) {
                        file.status = Status::Pending;
                        file.downloaded = 0;
                    }
                    true
                }
            };

            if !reset {
                continue;
            }

            if let Err(e) = self.persist_entry(&entry).await {
                tracing::error!(task_id = %id, error = %e, "Failed to persist recovered task");
            }
            tracing::debug!(task_id = %id, "Task reset for recovery");
            recovered.push((entry.read().await.created_at, id));
        }

        recovered.sort();
        let ids: Vec<TaskId> = recovered.into_iter().map(|(_, id)| id).collect();
        tracing::info!(count = ids.len(), "Recovered incomplete tasks");
        ids
    }
}
