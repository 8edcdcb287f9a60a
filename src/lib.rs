//! # file-downloader
//!
//! Batch HTTP file download service with crash recovery.
//!
//! A task is a list of URLs submitted together. Every URL becomes one file
//! entry that a bounded pool of workers probes, downloads and records. Task
//! state is persisted as one JSON record per task, so a restart picks up
//! whatever was left unfinished.
//!
//! ## Quick Start
//!
//! ```no_run
//! use file_downloader::{Config, FileDownloader, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.json")?;
//!     let downloader = FileDownloader::new(config).await?;
//!
//!     // Serves the API until SIGINT/SIGTERM, then drains and persists
//!     run_with_shutdown(downloader).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// HTTP download client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Bounded worker pool
pub mod pool;
/// In-memory task registry, progress aggregation and recovery
pub mod registry;
/// Download service facade and lifecycle
pub mod service;
/// Per-task JSON persistence
pub mod store;
/// Core types
pub mod types;

// Re-export commonly used types
pub use client::{FetchedFile, FileFetcher, HttpFetcher};
pub use config::{AdmissionPolicy, Config};
pub use error::{
    ApiError, Error, ErrorDetail, FetchError, Result, StoreError, ToHttpStatus,
};
pub use pool::{Submission, SubmitReport, WorkerPool};
pub use registry::{SharedTask, TaskRegistry};
pub use service::FileDownloader;
pub use store::TaskStore;
pub use types::{Status, Task, TaskFile, TaskId};

/// Run the service until a termination signal arrives.
///
/// Starts the workers and the API server, recovers unfinished tasks, and on
/// the first signal performs the graceful shutdown sequence.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Errors
///
/// Returns the API server error if the server could not bind or failed
/// while running.
pub async fn run_with_shutdown(downloader: FileDownloader) -> Result<()> {
    downloader.run_until(wait_for_signal()).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
