//! Startup and shutdown coordination.

use crate::error::{Error, Result};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

use super::FileDownloader;

/// Number of task records written concurrently by the final flush
const FLUSH_CONCURRENCY: usize = 8;

impl FileDownloader {
    /// Run the service until `shutdown` resolves.
    ///
    /// Sequence:
    /// 1. Reset unfinished stored tasks, start the worker pool and the API
    ///    server, then resubmit only the reset tasks
    /// 2. Wait for `shutdown` (or for the API server to exit on its own)
    /// 3. Stop accepting tasks and give the server up to the grace period to
    ///    finish in-flight requests
    /// 4. Stop the worker pool, letting in-flight files finish
    /// 5. Flush every task to the store
    ///
    /// # Errors
    ///
    /// Returns the API server's error (for example a failed bind) after the
    /// rest of the teardown has run.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        // Reset stored work before anything new can be submitted
        let recovered = self.registry.recover_incomplete_tasks().await;

        self.pool.start().await;

        let server_stop = CancellationToken::new();
        let mut server = tokio::spawn(crate::api::start_api_server(
            self.clone(),
            server_stop.clone(),
        ));

        let report = self.pool.resume_tasks(&recovered).await;
        tracing::info!(
            queued = report.queued,
            dropped = report.dropped,
            refused = report.refused,
            "Startup recovery complete"
        );

        let exited_early = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                None
            }
            joined = &mut server => {
                tracing::error!("API server exited before shutdown was requested");
                Some(joined)
            }
        };

        tracing::info!("Initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);
        server_stop.cancel();

        let joined = match exited_early {
            Some(joined) => joined,
            None => {
                let grace = self.config.shutdown.grace_period;
                match tokio::time::timeout(grace, &mut server).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(
                            grace_secs = grace.as_secs(),
                            "Timeout waiting for API server, aborting it"
                        );
                        server.abort();
                        Ok(Ok(()))
                    }
                }
            }
        };

        let outcome = match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "API server failed");
                Err(e)
            }
            Err(e) => {
                tracing::error!(error = %e, "API server task panicked");
                Err(Error::ApiServerError(e.to_string()))
            }
        };

        self.pool.stop().await;
        self.flush_all().await;

        tracing::info!("Graceful shutdown complete");
        outcome
    }

    /// Shut down without an API server: stop accepting tasks, stop the
    /// workers and flush every task to the store.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new tasks");

        self.pool.stop().await;
        self.flush_all().await;

        tracing::info!("Graceful shutdown complete");
    }

    /// Persist every task. Failures are logged; returns the number of tasks
    /// that could not be saved.
    pub(crate) async fn flush_all(&self) -> usize {
        let tasks = self.registry.all_tasks().await;
        let count = tasks.len();
        let registry = &self.registry;

        let failed = stream::iter(tasks)
            .map(|(id, entry)| async move {
                match registry.persist_entry(&entry).await {
                    Ok(()) => 0,
                    Err(e) => {
                        tracing::error!(task_id = %id, error = %e, "Failed to persist task during shutdown");
                        1
                    }
                }
            })
            .buffer_unordered(FLUSH_CONCURRENCY)
            .fold(0usize, |acc, n| async move { acc + n })
            .await;

        if failed == 0 {
            tracing::info!(count, "Final state persisted");
        } else {
            tracing::warn!(count, failed, "Final state partially persisted");
        }
        failed
    }
}
