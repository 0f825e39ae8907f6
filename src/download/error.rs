//! Error types for the download module.
//!
//! [`DownloadError`] covers per-file failures surfaced on the batch error
//! channel; [`ConfigError`] covers construction-time misconfiguration,
//! rejected before any download begins.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while downloading one file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS
    /// errors, body stream interruption).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (429 is retryable, everything else terminal).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create temp file, write,
    /// rename, hash an existing file).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The response carried an unparseable Content-Length header.
    #[error("invalid content length downloading {url}")]
    ContentLength {
        /// The URL whose response had a bad Content-Length.
        url: String,
    },

    /// Creating the destination's parent directory failed. Not retried;
    /// filesystem errors are not transient.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a content-length parse error.
    pub fn content_length(url: impl Into<String>) -> Self {
        Self::ContentLength { url: url.into() }
    }

    /// Creates a directory-creation error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }
}

// Note on From trait implementations:
// No blanket `From<reqwest::Error>` / `From<std::io::Error>` impls - the
// variants require context (url, path) the source errors don't carry, so
// the helper constructors are the conversion surface.

/// Construction-time configuration errors. The engine fails fast here,
/// before any download begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No base URL was configured.
    #[error("base url is empty")]
    MissingBaseUrl,

    /// Concurrency must be at least 1.
    #[error("invalid concurrency value {value}: must be at least 1")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The request budget must admit at least one request per second.
    #[error("invalid rate limit {value}: must be at least 1 permit per second")]
    InvalidRate {
        /// The invalid value that was provided.
        value: usize,
    },

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header {name:?}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}
