//! Durable task persistence
//!
//! One pretty-printed JSON document per task, named `<task-id>.json`, in a
//! single state directory. Writes go to `<task-id>.json.tmp` first and are
//! renamed into place, so a crash mid-write never truncates an existing
//! record.

use crate::error::{Result, StoreError};
use crate::types::{Task, TaskId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Extension of task documents
const RECORD_EXTENSION: &str = "json";

/// Suffix of in-progress writes
const TEMP_SUFFIX: &str = "tmp";

/// File-per-task store
#[derive(Debug, Clone)]
pub struct TaskStore {
    state_dir: PathBuf,
}

impl TaskStore {
    /// Create a store rooted at `state_dir`. The directory is created lazily
    /// on the first save.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// The state directory
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Path of the document for `id`
    pub fn record_path(&self, id: &TaskId) -> PathBuf {
        self.state_dir
            .join(format!("{}.{}", id.as_str(), RECORD_EXTENSION))
    }

    /// Serialize and write a task, replacing any previous record
    pub async fn save(&self, task: &Task) -> Result<()> {
        tokio::fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.state_dir.clone(),
                source,
            })?;

        let data = serde_json::to_vec_pretty(task).map_err(|source| StoreError::Encode {
            id: task.id.to_string(),
            source,
        })?;

        let path = self.record_path(&task.id);
        let tmp_path = path.with_extension(format!("{}.{}", RECORD_EXTENSION, TEMP_SUFFIX));

        tokio::fs::write(&tmp_path, &data)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;

        if let Err(source) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io { path, source }.into());
        }

        tracing::debug!(task_id = %task.id, path = %path.display(), "Saved task");
        Ok(())
    }

    /// Same as [`save`](Self::save): records are always overwritten whole
    pub async fn update(&self, task: &Task) -> Result<()> {
        self.save(task).await
    }

    /// Read and decode one task
    pub async fn load(&self, id: &TaskId) -> Result<Task> {
        let path = self.record_path(id);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        let task = serde_json::from_slice(&data)
            .map_err(|source| StoreError::Decode { path, source })?;
        Ok(task)
    }

    /// Load every record in the state directory.
    ///
    /// A missing directory yields an empty map. Records that cannot be read
    /// or decoded are skipped with a warning.
    pub async fn load_all(&self) -> Result<HashMap<TaskId, Task>> {
        let mut tasks = HashMap::new();

        let mut entries = match tokio::fs::read_dir(&self.state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    state_dir = %self.state_dir.display(),
                    "State directory does not exist, starting fresh"
                );
                return Ok(tasks);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.state_dir.clone(),
                    source,
                }
                .into());
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(StoreError::Io {
                        path: self.state_dir.clone(),
                        source,
                    }
                    .into());
                }
            };

            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = TaskId::from(stem);

            match self.load(&id).await {
                Ok(task) => {
                    if task.id != id {
                        tracing::warn!(
                            file_id = %id,
                            record_id = %task.id,
                            "Task record name does not match its id, keeping record id"
                        );
                    }
                    tasks.insert(task.id.clone(), task);
                }
                Err(e) => {
                    tracing::warn!(task_id = %id, error = %e, "Failed to load task, skipping");
                }
            }
        }

        tracing::debug!(count = tasks.len(), "Loaded tasks from state directory");
        Ok(tasks)
    }

    /// Remove a task record. Removing an absent record succeeds.
    pub async fn delete(&self, id: &TaskId) -> Result<()> {
        let path = self.record_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(task_id = %id, "Deleted task");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }.into()),
        }
    }
}
