//! Core types for file-downloader

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use utoipa::ToSchema;

/// Filename used when a URL has no usable last path segment
pub const UNKNOWN_FILENAME: &str = "unknown_file";

/// Process-wide sequence that keeps IDs generated in the same nanosecond apart
static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a task
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh ID of the form `task_<unix-nanos>_<sequence>`.
    ///
    /// The sequence is shared by all threads of the process, so concurrent
    /// calls never collide even when the clock reading is identical.
    pub fn generate() -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("task_{}_{}", nanos, seq))
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status shared by files and tasks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Waiting in the queue (or not yet submitted)
    #[default]
    Pending,
    /// A worker is transferring the file
    Downloading,
    /// Successfully downloaded
    Completed,
    /// Probe or fetch failed
    Failed,
}

impl Status {
    /// Lowercase name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Downloading => "downloading",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// Pending or downloading
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Status::Pending | Status::Downloading)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One URL-to-local-file download unit within a task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskFile {
    /// Source URL
    pub url: String,
    /// Local file name (initial guess, replaced by the saved name on completion)
    pub filename: String,
    /// Current status
    pub status: Status,
    /// Size in bytes: 0 until probed, -1 when the server declares none
    pub size: i64,
    /// Bytes written (0 or `size`)
    pub downloaded: i64,
    /// When the file entry was created
    pub created_at: DateTime<Utc>,
}

impl TaskFile {
    /// New pending file with a filename guessed from the URL
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            filename: guess_filename(&url),
            url,
            status: Status::Pending,
            size: 0,
            downloaded: 0,
            created_at: Utc::now(),
        }
    }
}

/// A batch of files submitted together
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Unique task ID
    #[schema(value_type = String)]
    pub id: TaskId,
    /// Submitted URLs, positionally matching `files`
    pub urls: Vec<String>,
    /// Aggregate status derived from the files
    pub status: Status,
    /// One entry per URL
    pub files: Vec<TaskFile>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// Aggregate progress, 0-100
    pub progress: u8,
}

impl Task {
    /// New pending task with one pending file per URL
    pub fn new(id: TaskId, urls: Vec<String>) -> Self {
        let files = urls.iter().map(TaskFile::new).collect();
        Self {
            id,
            urls,
            status: Status::Pending,
            files,
            created_at: Utc::now(),
            progress: 0,
        }
    }
}

/// Best-effort filename from the last `/`-separated segment of a URL
pub fn guess_filename(url: &str) -> String {
    match url.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => UNKNOWN_FILENAME.to_string(),
    }
}

/// Request body for POST /tasks
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    /// URLs to download, in order
    pub urls: Vec<String>,
}

/// Response body for POST /tasks
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTaskResponse {
    /// ID of the created task
    pub task_id: String,
}

/// Response body for GET /tasks/:id/status
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskStatusResponse {
    /// Task ID
    pub id: String,
    /// Aggregate status
    pub status: Status,
    /// Aggregate progress, 0-100
    pub progress: u8,
    /// Per-file state
    pub files: Vec<TaskFile>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id.0,
            status: task.status,
            progress: task.progress,
            files: task.files,
        }
    }
}
