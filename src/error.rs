//! Error types for file-downloader
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (store, fetch, configuration)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for file-downloader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for file-downloader
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "worker.count")
        key: Option<String>,
    },

    /// Task store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Download of a single file failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task not found
    #[error("task not found: {0}")]
    NotFound(String),

    /// Request rejected before reaching the core
    #[error("validation error: {0}")]
    Validation(String),

    /// Work queue is full and the admission policy refuses the unit
    #[error("work queue full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Task store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading, writing, renaming or listing a state file failed
    #[error("I/O failure on {path}: {source}")]
    Io {
        /// The file or directory involved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A state file could not be decoded
    #[error("failed to decode {path}: {source}")]
    Decode {
        /// The state file that failed to decode
        path: PathBuf,
        /// The underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// A task could not be encoded
    #[error("failed to encode task {id}: {source}")]
    Encode {
        /// The task that failed to encode
        id: String,
        /// The underlying encode error
        #[source]
        source: serde_json::Error,
    },
}

/// Per-file download errors
///
/// These never escalate beyond the worker: they are recorded as a failed
/// file status and logged.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Server answered with something other than 200 OK
    #[error("bad status code {status} for {url}")]
    BadStatus {
        /// The requested URL
        url: String,
        /// The HTTP status code received
        status: u16,
    },

    /// Declared or streamed size exceeds the configured limit
    #[error("file size {size} exceeds limit {limit}")]
    TooLarge {
        /// Size seen so far (declared or streamed)
        size: u64,
        /// Configured maximum
        limit: u64,
    },

    /// The request could not be sent or the body could not be read
    #[error("request to {url} failed: {source}")]
    Request {
        /// The requested URL
        url: String,
        /// The underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The downloaded content could not be written to disk
    #[error("failed to write {path}: {source}")]
    Write {
        /// Destination path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "task task_1 not found"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 500 Internal Server Error - Server-side issues
            Error::Store(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - Remote server errors
            Error::Fetch(_) => 502,

            // 503 Service Unavailable
            Error::QueueFull { .. } => 503,
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::Store(e) => match e {
                StoreError::Io { .. } => "store_io_error",
                StoreError::Decode { .. } => "store_decode_error",
                StoreError::Encode { .. } => "store_encode_error",
            },
            Error::Fetch(e) => match e {
                FetchError::BadStatus { .. } => "bad_status",
                FetchError::TooLarge { .. } => "too_large",
                FetchError::Request { .. } => "request_failed",
                FetchError::Write { .. } => "write_failed",
            },
            Error::Io(_) => "io_error",
            Error::QueueFull { .. } => "queue_full",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::QueueFull { capacity } => Some(serde_json::json!({
                "capacity": capacity,
            })),
            Error::Store(StoreError::Io { path, .. })
            | Error::Store(StoreError::Decode { path, .. }) => Some(serde_json::json!({
                "path": path,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
