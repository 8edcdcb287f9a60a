//! Configuration types for file-downloader
//!
//! Every field has a default, so `Config::default()` is a working setup.
//! [`Config::load`] layers a JSON file and environment overrides on top of
//! the defaults and validates the result.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Log levels accepted by [`LoggingConfig::level`]
const VALID_LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];

/// Log formats accepted by [`LoggingConfig::format`]
const VALID_LOG_FORMATS: &[&str] = &["json", "text"];

/// Main configuration for the download service
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,

    /// Worker pool sizing and admission control
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Download client behavior
    #[serde(default)]
    pub download: DownloadConfig,

    /// Task state storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Teardown timing
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// Worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers (default: 3)
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Work queue capacity in file units (default: 0 = twice the worker count)
    #[serde(default)]
    pub queue_capacity: usize,

    /// What happens when a unit is submitted to a full queue
    #[serde(default)]
    pub admission: AdmissionPolicy,
}

impl WorkerConfig {
    /// Queue capacity after resolving the "twice the worker count" default
    pub fn effective_queue_capacity(&self) -> usize {
        if self.queue_capacity == 0 {
            (self.count * 2).max(1)
        } else {
            self.queue_capacity
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_capacity: 0,
            admission: AdmissionPolicy::default(),
        }
    }
}

/// Admission policy applied when the work queue is full
///
/// Serialized as `"drop"`, `"reject"` or `{"block": {"timeout": 5}}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Discard the unit with a warning; the submitter never blocks or fails (default)
    #[default]
    Drop,
    /// Refuse the unit with [`Error::QueueFull`]
    Reject,
    /// Wait up to `timeout` for space, then refuse with [`Error::QueueFull`]
    Block {
        /// Maximum time to wait for queue space
        #[serde(with = "duration_serde")]
        timeout: Duration,
    },
}

/// Download client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Per-request timeout for size probes and content fetches (default: 60 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Maximum accepted file size in bytes (default: 100 MiB, 0 = unlimited)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            timeout: default_timeout(),
            max_file_size: default_max_file_size(),
            user_agent: default_user_agent(),
        }
    }
}

/// Task state storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding one JSON document per task (default: "./state")
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level: debug, info, warn or error (default: info)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json or text (default: json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Force debug output regardless of `level`
    #[serde(default)]
    pub debug_mode: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            debug_mode: false,
        }
    }
}

/// Shutdown configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long the API server may take to finish in-flight requests (default: 30 seconds)
    #[serde(default = "default_grace_period", with = "duration_serde")]
    pub grace_period: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the JSON file at `path` (if it
    /// exists), then environment overrides, then validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| Error::Config {
                message: format!("failed to parse {}: {}", path.display(), e),
                key: None,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Config::default()
            }
            Err(e) => {
                return Err(Error::Config {
                    message: format!("failed to read {}: {}", path.display(), e),
                    key: None,
                });
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Recognized: `SERVER_PORT`, `WORKER_COUNT`, `LOG_LEVEL`, `LOG_FORMAT`, `DEBUG`.
    /// Unparseable numeric values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SERVER_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.api.bind_address.set_port(port);
        }

        if let Some(count) = lookup("WORKER_COUNT").and_then(|c| c.parse::<usize>().ok())
            && count > 0
        {
            self.worker.count = count;
        }

        if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.is_empty()) {
            self.logging.level = level.to_lowercase();
        }

        if let Some(format) = lookup("LOG_FORMAT").filter(|f| !f.is_empty()) {
            self.logging.format = format.to_lowercase();
        }

        if let Some(debug) = lookup("DEBUG").filter(|d| !d.is_empty()) {
            self.logging.debug_mode = debug == "true" || debug == "1";
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.api.bind_address.port() == 0 {
            return Err(Error::Config {
                message: "invalid server port: 0".to_string(),
                key: Some("server.api.bind_address".to_string()),
            });
        }

        if self.worker.count == 0 {
            return Err(Error::Config {
                message: "worker count must be positive: 0".to_string(),
                key: Some("worker.count".to_string()),
            });
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::Config {
                message: format!("invalid log level: {}", self.logging.level),
                key: Some("logging.level".to_string()),
            });
        }

        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(Error::Config {
                message: format!("invalid log format: {}", self.logging.format),
                key: Some("logging.format".to_string()),
            });
        }

        Ok(())
    }

    /// True when debug output was requested through the flag or the level
    pub fn is_debug_mode(&self) -> bool {
        self.logging.debug_mode || self.logging.level == "debug"
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_worker_count() -> usize {
    3
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_user_agent() -> String {
    "FileDownloader/1.0".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_grace_period() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
