//! Configured HTTP transport for the download pipeline.
//!
//! The engine only needs one verb: GET with the configured header
//! profile, cookies, and a bounded per-request timeout. Status handling
//! and body streaming live in the engine; this wrapper maps transport
//! failures into the error taxonomy.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use super::constants::MAX_CONNECTIONS;
use super::error::{ConfigError, DownloadError};

/// Transport configuration assembled by the downloader builder.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Per-request total timeout (connect + headers + body).
    pub timeout: Duration,
    /// Accept invalid TLS certificates. The archive mirrors rotate
    /// certificates carelessly; verification failures would otherwise
    /// kill whole batches.
    pub accept_invalid_certs: bool,
    /// Headers attached to every request.
    pub headers: Vec<(String, String)>,
    /// Cookie pairs joined into a static `Cookie` header.
    pub cookies: Vec<(String, String)>,
}

/// HTTP client for downloading files with streaming support.
///
/// Created once per [`Downloader`](super::Downloader) and reused for all
/// requests, taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds the underlying reqwest client from the transport options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeader`] for header or cookie values
    /// that are not valid HTTP, and [`ConfigError::Client`] when the
    /// client itself cannot be built.
    pub fn new(options: &TransportOptions) -> Result<Self, ConfigError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in &options.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| ConfigError::InvalidHeader {
                    name: name.clone(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader {
                    name: name.clone(),
                })?;
            header_map.insert(header_name, header_value);
        }

        if !options.cookies.is_empty() {
            let joined = options
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            let cookie_value =
                HeaderValue::from_str(&joined).map_err(|_| ConfigError::InvalidHeader {
                    name: COOKIE.to_string(),
                })?;
            header_map.insert(COOKIE, cookie_value);
        }

        debug!(
            timeout_secs = options.timeout.as_secs(),
            header_count = header_map.len(),
            "building HTTP client"
        );

        let client = Client::builder()
            .timeout(options.timeout)
            .default_headers(header_map)
            .pool_max_idle_per_host(MAX_CONNECTIONS)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .gzip(true)
            .build()
            .map_err(|source| ConfigError::Client { source })?;

        Ok(Self { client })
    }

    /// Issues a GET with the configured headers and cookies.
    ///
    /// The response is returned regardless of status; callers inspect it.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for unparseable URLs,
    /// [`DownloadError::Timeout`] when the request deadline passes, and
    /// [`DownloadError::Network`] for other transport failures.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        self.client.get(url).send().await.map_err(|error| {
            if error.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, error)
            }
        })
    }
}
