//! Task progress and status aggregation

use crate::types::{Status, Task, TaskFile};

/// Recompute `task.progress` and `task.status` from its files
pub fn aggregate(task: &mut Task) {
    task.progress = compute_progress(&task.files);
    task.status = derive_status(&task.files, task.progress);
}

/// Progress percentage, 0-100.
///
/// Byte-weighted over files with a known positive size when there are any,
/// otherwise the share of completed files.
pub fn compute_progress(files: &[TaskFile]) -> u8 {
    if files.is_empty() {
        return 0;
    }

    let (total, downloaded) = files
        .iter()
        .filter(|f| f.size > 0)
        .fold((0i128, 0i128), |(total, done), f| {
            (total + f.size as i128, done + f.downloaded as i128)
        });

    let percent = if total > 0 {
        downloaded * 100 / total
    } else {
        let completed = files.iter().filter(|f| f.status == Status::Completed).count() as i128;
        completed * 100 / files.len() as i128
    };

    percent.clamp(0, 100) as u8
}

/// Aggregate status, first match wins:
/// all completed, any downloading, all failed, some progress, else pending
pub fn derive_status(files: &[TaskFile], progress: u8) -> Status {
    if files.is_empty() {
        return Status::Pending;
    }
    if files.iter().all(|f| f.status == Status::Completed) {
        return Status::Completed;
    }
    if files.iter().any(|f| f.status == Status::Downloading) {
        return Status::Downloading;
    }
    if files.iter().all(|f| f.status == Status::Failed) {
        return Status::Failed;
    }
    if progress > 0 {
        return Status::Downloading;
    }
    Status::Pending
}
