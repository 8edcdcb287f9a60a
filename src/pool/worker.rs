//! Worker loop and per-file processing

use super::DownloadUnit;
use crate::client::{FileFetcher, extract_filename};
use crate::registry::TaskRegistry;
use crate::types::{Status, TaskFile};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Drain the queue until it closes or `cancel` fires.
///
/// Cancellation is only observed between units; a unit being processed runs
/// to completion.
pub(super) async fn run(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<DownloadUnit>>>,
    cancel: CancellationToken,
    registry: Arc<TaskRegistry>,
    fetcher: Arc<dyn FileFetcher>,
) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(worker_id, "Worker cancelled");
                return;
            }
            unit = async { receiver.lock().await.recv().await } => unit,
        };

        match next {
            Some(unit) => process_unit(unit, &registry, fetcher.as_ref()).await,
            None => {
                tracing::debug!(worker_id, "Work queue closed");
                return;
            }
        }
    }
}

/// Apply `f` to the unit's file under the task's write lock
async fn update_file(unit: &DownloadUnit, f: impl FnOnce(&mut TaskFile)) {
    let mut task = unit.task.write().await;
    match task.files.get_mut(unit.index) {
        Some(file) => f(file),
        None => tracing::warn!(
            task_id = %unit.task_id,
            file_index = unit.index,
            "File index out of range"
        ),
    }
}

/// Download one file and fold the outcome into its task.
///
/// Probe, then fetch. Either failing marks the file failed. The task is
/// re-aggregated and persisted afterwards regardless of the outcome.
pub(super) async fn process_unit(unit: DownloadUnit, registry: &TaskRegistry, fetcher: &dyn FileFetcher) {
    tracing::debug!(
        task_id = %unit.task_id,
        file_index = unit.index,
        url = %unit.url,
        "Processing file"
    );

    update_file(&unit, |file| file.status = Status::Downloading).await;

    match download(&unit, fetcher).await {
        Ok((size, filename)) => {
            tracing::info!(
                task_id = %unit.task_id,
                file_index = unit.index,
                url = %unit.url,
                size,
                filename = %filename,
                "Download completed"
            );
            update_file(&unit, |file| {
                file.status = Status::Completed;
                file.size = size;
                file.downloaded = size;
                file.filename = filename;
            })
            .await;
        }
        Err(e) => {
            tracing::error!(
                task_id = %unit.task_id,
                file_index = unit.index,
                url = %unit.url,
                error = %e,
                "Download failed"
            );
            update_file(&unit, |file| file.status = Status::Failed).await;
        }
    }

    registry.refresh_progress(&unit.task_id).await;
}

/// Probe and fetch; returns the recorded size and the saved name
async fn download(unit: &DownloadUnit, fetcher: &dyn FileFetcher) -> crate::Result<(i64, String)> {
    let probed = fetcher.probe_size(&unit.url).await?;
    update_file(unit, |file| file.size = probed).await;

    let fetched = fetcher.fetch(&unit.url, &extract_filename(&unit.url)).await?;

    let size = if probed > 0 {
        probed
    } else {
        i64::try_from(fetched.bytes_written).unwrap_or(i64::MAX)
    };
    Ok((size, fetched.filename))
}
