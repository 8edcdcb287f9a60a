//! Shared test helpers for creating FileDownloader instances in tests.

use crate::client::{FetchedFile, FileFetcher};
use crate::config::Config;
use crate::error::FetchError;
use crate::service::FileDownloader;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;

/// Fetcher that never touches the network.
///
/// Probes of URLs in `failing` fail with a 404; every other URL probes as
/// `probe_size` and fetches `body_len` bytes after `delay`.
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    pub probe_size: i64,
    pub body_len: u64,
    pub failing: HashSet<String>,
    pub delay: Duration,
    pub fetches: AtomicUsize,
}

impl MockFetcher {
    /// Fetcher where every file succeeds with `len` bytes
    pub fn succeeding(len: u64) -> Self {
        Self {
            probe_size: len as i64,
            body_len: len,
            ..Default::default()
        }
    }

    /// Number of completed fetch calls
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileFetcher for MockFetcher {
    async fn probe_size(&self, url: &str) -> crate::Result<i64> {
        if self.failing.contains(url) {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: 404,
            }
            .into());
        }
        Ok(self.probe_size)
    }

    async fn fetch(&self, _url: &str, filename: &str) -> crate::Result<FetchedFile> {
        tokio::time::sleep(self.delay).await;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedFile {
            filename: filename.to_string(),
            bytes_written: self.body_len,
        })
    }
}

/// Config with every directory inside `root` and the API on an ephemeral port
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.persistence.state_dir = root.join("state");
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    config.shutdown.grace_period = Duration::from_secs(2);
    config.worker.count = 2;
    config
}

/// Helper to create a test FileDownloader with the given fetcher.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    fetcher: Arc<dyn FileFetcher>,
) -> (FileDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let downloader = FileDownloader::with_fetcher(config, fetcher).await.unwrap();
    (downloader, temp_dir)
}
