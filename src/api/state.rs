//! Application state for the API server

use crate::{Config, FileDownloader};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// The download service
    pub downloader: FileDownloader,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: FileDownloader, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
