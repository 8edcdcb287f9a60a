//! file-downloader binary
//!
//! Usage: `file-downloader [CONFIG_PATH]` (default `config.json`).

use file_downloader::{Config, FileDownloader, run_with_shutdown};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "File downloader exited with error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> file_downloader::Result<()> {
    tracing::info!(
        bind_address = %config.server.api.bind_address,
        workers = config.worker.count,
        "Starting file downloader"
    );
    let downloader = FileDownloader::new(config).await?;
    run_with_shutdown(downloader).await
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(config: &Config) {
    let level = if config.is_debug_mode() {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}
