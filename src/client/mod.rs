//! HTTP download client
//!
//! [`FileFetcher`] is the seam between the worker pool and the network. The
//! production implementation, [`HttpFetcher`], issues a HEAD request to learn
//! the declared size and a streamed GET to write the content into the
//! download directory.

use crate::config::DownloadConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::UNKNOWN_FILENAME;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Keeps concurrent downloads of the same name on separate part files
static PART_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Extensions that are kept as-is even when the server declares a content type
const KNOWN_EXTENSIONS: &[&str] = &[
    "html", "htm", "txt", "pdf", "png", "jpg", "jpeg", "gif", "css", "js",
];

/// Media type to file extension, consulted when a name lacks a known extension.
///
/// `text/html` is not listed; it takes the `.html` fallback.
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("application/gzip", ".gz"),
    ("application/javascript", ".js"),
    ("application/json", ".json"),
    ("application/octet-stream", ".bin"),
    ("application/pdf", ".pdf"),
    ("application/wasm", ".wasm"),
    ("application/xml", ".xml"),
    ("application/zip", ".zip"),
    ("audio/mpeg", ".mp3"),
    ("image/avif", ".avif"),
    ("image/gif", ".gif"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/svg+xml", ".svg"),
    ("image/webp", ".webp"),
    ("text/css", ".css"),
    ("text/csv", ".csv"),
    ("text/javascript", ".js"),
    ("text/plain", ".txt"),
    ("text/xml", ".xml"),
    ("video/mp4", ".mp4"),
];

/// Outcome of a successful content fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Name the content was saved under, relative to the download directory
    pub filename: String,
    /// Number of bytes written
    pub bytes_written: u64,
}

/// Network operations needed to download one file
///
/// Implementations must be cheap to share between workers.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Ask the server for the size of `url` without downloading it.
    ///
    /// Returns the declared length, or -1 when the server does not declare one.
    ///
    /// # Errors
    ///
    /// Fails when the request cannot be sent or the status is not 200.
    async fn probe_size(&self, url: &str) -> Result<i64>;

    /// Download `url` into the download directory.
    ///
    /// `filename` is the caller's preferred name; the server may override it
    /// through `Content-Disposition` and the declared content type may add an
    /// extension. The returned [`FetchedFile`] carries the name actually used.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, a non-200 status, content larger than the
    /// configured limit, or a local write failure. A failed fetch leaves any
    /// existing file of the same name untouched.
    async fn fetch(&self, url: &str, filename: &str) -> Result<FetchedFile>;
}

/// [`FileFetcher`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    download_dir: PathBuf,
    max_file_size: u64,
}

impl HttpFetcher {
    /// Build a fetcher from the download configuration
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            download_dir: config.download_dir.clone(),
            max_file_size: config.max_file_size,
        })
    }

    /// Directory downloads are written into
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn exceeds_limit(&self, size: u64) -> bool {
        self.max_file_size > 0 && size > self.max_file_size
    }

    async fn write_body(&self, mut response: reqwest::Response, url: &str, path: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|source| FetchError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })? {
            written += chunk.len() as u64;
            if self.exceeds_limit(written) {
                return Err(FetchError::TooLarge {
                    size: written,
                    limit: self.max_file_size,
                }
                .into());
            }
            file.write_all(&chunk)
                .await
                .map_err(|source| FetchError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        file.flush().await.map_err(|source| FetchError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(written)
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn probe_size(&self, url: &str) -> Result<i64> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        let size = declared_length(response.headers())
            .and_then(|len| i64::try_from(len).ok())
            .unwrap_or(-1);
        tracing::debug!(url, size, "Probed file size");
        Ok(size)
    }

    async fn fetch(&self, url: &str, filename: &str) -> Result<FetchedFile> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        if let Some(len) = declared_length(response.headers())
            && self.exceeds_limit(len)
        {
            return Err(FetchError::TooLarge {
                size: len,
                limit: self.max_file_size,
            }
            .into());
        }

        let name = sanitize_filename(&resolve_filename(filename, response.headers()));

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|source| FetchError::Write {
                path: self.download_dir.clone(),
                source,
            })?;

        let path = self.download_dir.join(&name);
        let part = self.download_dir.join(part_file_name(&name));

        let written = match self.write_body(response, url, &part).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        if let Err(source) = tokio::fs::rename(&part, &path).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(FetchError::Write { path, source }.into());
        }

        tracing::debug!(url, filename = %name, bytes_written = written, "Saved file");
        Ok(FetchedFile {
            filename: name,
            bytes_written: written,
        })
    }
}

/// Hidden per-download name the body is streamed into before the final rename
fn part_file_name(name: &str) -> String {
    let seq = PART_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(".{}.{}.{}.part", name, std::process::id(), seq)
}

/// Filename from the last path segment of a URL.
///
/// Query and fragment are ignored. Falls back to `file_<len(url)>` when the
/// URL does not parse or its path has no final segment.
pub fn extract_filename(url: &str) -> String {
    let fallback = || format!("file_{}", url.len());

    let Ok(parsed) = url::Url::parse(url) else {
        return fallback();
    };

    match parsed.path().rsplit('/').next() {
        Some(segment) if !segment.is_empty() => urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string()),
        _ => fallback(),
    }
}

/// Final name for a download: the server's `Content-Disposition` name wins
/// over `requested`, then an extension is inferred from the content type
/// when the name has none of the known ones.
pub fn resolve_filename(requested: &str, headers: &HeaderMap) -> String {
    let mut name = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_disposition)
        .unwrap_or_else(|| requested.to_string());

    if let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
        && !content_type.trim().is_empty()
        && !has_known_extension(&name)
    {
        if let Some(ext) = extension_for_content_type(content_type) {
            name.push_str(ext);
        } else if content_type.to_lowercase().contains("text/html") {
            name.push_str(".html");
        }
    }

    name
}

/// Filename declared by a `Content-Disposition` header value.
///
/// The RFC 5987 `filename*=charset''value` form is preferred and
/// percent-decoded; plain `filename=` values have surrounding quotes removed.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    let params: Vec<&str> = value.split(';').map(str::trim).collect();

    let extended = params.iter().find_map(|p| {
        let v = strip_prefix_ignore_case(p, "filename*=")?;
        let (_, encoded) = v.split_once("''")?;
        if encoded.is_empty() {
            return None;
        }
        Some(
            urlencoding::decode(encoded)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| encoded.to_string()),
        )
    });
    if extended.is_some() {
        return extended;
    }

    params.iter().find_map(|p| {
        let v = strip_prefix_ignore_case(p, "filename=")?.trim_matches('"');
        (!v.is_empty()).then(|| v.to_string())
    })
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

fn has_known_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| KNOWN_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(mt, _)| *mt == media_type)
        .map(|(_, ext)| *ext)
}

/// Reduce a server- or URL-supplied name to a single safe path component
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    match last {
        "" | "." | ".." => UNKNOWN_FILENAME.to_string(),
        other => other.chars().filter(|c| !c.is_control()).collect(),
    }
}

/// `Content-Length` as declared by the server, if present and numeric
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
