//! The download orchestrator and per-file pipeline.
//!
//! [`Downloader`] owns the configured transport, the global rate limiter,
//! and the progress reporter. [`Downloader::download`] fans one post's
//! attachment queue out to a semaphore-bounded pool of workers; each
//! worker resolves the save path, short-circuits on an intact existing
//! file, and otherwise streams the attachment to a temp file that is
//! atomically renamed into place. Per-file errors land on a batch error
//! channel; a failing file never aborts its siblings.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kemono_dl::{Creator, DownloaderBuilder, Post, StatusSink, add_index_to_attachments};
//!
//! struct StdoutSink;
//! impl StatusSink for StdoutSink {
//!     fn print(&self, line: &str) {
//!         println!("{line}");
//!     }
//!     fn set_status(&self, _lines: Vec<String>) {}
//! }
//!
//! # async fn example(creator: Creator, post: Post) -> Result<(), kemono_dl::ConfigError> {
//! let downloader = DownloaderBuilder::new()
//!     .base_url("https://kemono.example")
//!     .async_mode(true)
//!     .max_concurrent(5)
//!     .rate_limit(2)
//!     .build(Arc::new(StdoutSink))?;
//!
//! let queue = add_index_to_attachments(post.attachments.clone());
//! let mut errors = downloader.download(queue, &creator, &post).await;
//! while let Some(error) = errors.recv().await {
//!     eprintln!("download error: {error}");
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::CONTENT_LENGTH;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use super::client::{HttpClient, TransportOptions};
use super::constants::{
    BAR_WIDTH, DEFAULT_MAX_CONCURRENT, DEFAULT_POST_DOWNLOAD_DELAY, DEFAULT_RATE_LIMIT,
    DEFAULT_RETRIES, DEFAULT_TIMEOUT, STATUS_INTERVAL, default_headers,
};
use super::error::{ConfigError, DownloadError};
use super::integrity;
use super::rate_limiter::RateLimiter;
use super::retry::{FailureKind, RetryPolicy, classify_error};
use crate::model::{Creator, FileWithIndex, Post};
use crate::paths::{SavePathFn, default_save_path};
use crate::progress::{Bar, Progress, StatusSink};

/// Builder for [`Downloader`]. All knobs have defaults tuned for the
/// target sites; only the base URL is mandatory.
pub struct DownloaderBuilder {
    base_url: String,
    max_concurrent: usize,
    async_mode: bool,
    overwrite: bool,
    max_size: u64,
    min_size: u64,
    timeout: Duration,
    rate_limit: usize,
    retries: u32,
    retry_interval: Duration,
    post_download_delay: Duration,
    save_content: bool,
    accept_invalid_certs: bool,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    save_path: SavePathFn,
}

impl Default for DownloaderBuilder {
    fn default() -> Self {
        let save_path: SavePathFn = Arc::new(default_save_path);
        Self {
            base_url: String::new(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            async_mode: false,
            overwrite: false,
            max_size: u64::MAX,
            min_size: 0,
            timeout: DEFAULT_TIMEOUT,
            rate_limit: DEFAULT_RATE_LIMIT,
            retries: DEFAULT_RETRIES,
            retry_interval: Duration::ZERO,
            post_download_delay: DEFAULT_POST_DOWNLOAD_DELAY,
            save_content: false,
            accept_invalid_certs: true,
            headers: default_headers(),
            cookies: Vec::new(),
            save_path,
        }
    }
}

impl DownloaderBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Site base URL prepended to every attachment path. Mandatory.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Maximum concurrent download workers. Ignored (forced to 1) unless
    /// [`async_mode`](Self::async_mode) is enabled.
    #[must_use]
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Download several files at the same time. Completion order across a
    /// batch becomes non-deterministic; callers that need on-disk order
    /// should encode it into the save path instead.
    #[must_use]
    pub fn async_mode(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    /// Re-download files even when an intact copy exists.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Skip files larger than this many bytes.
    #[must_use]
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Skip files smaller than this many bytes.
    #[must_use]
    pub fn min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Per-attempt request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Global request budget in permits per second.
    #[must_use]
    pub fn rate_limit(mut self, permits_per_second: usize) -> Self {
        self.rate_limit = permits_per_second;
        self
    }

    /// Retry budget for transient failures; 0 means a single attempt.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Fixed delay between attempts.
    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Courtesy pause after each completed file, on top of the rate
    /// limiter.
    #[must_use]
    pub fn post_download_delay(mut self, delay: Duration) -> Self {
        self.post_download_delay = delay;
        self
    }

    /// Also write each post's HTML content next to its files.
    #[must_use]
    pub fn save_content(mut self, save_content: bool) -> Self {
        self.save_content = save_content;
        self
    }

    /// Accept invalid TLS certificates (defaults to on; the archive
    /// mirrors are careless with theirs).
    #[must_use]
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Replaces the default header profile.
    #[must_use]
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Adds one header on top of the current profile.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Cookie pairs attached to every request.
    #[must_use]
    pub fn cookies(mut self, cookies: Vec<(String, String)>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Replaces the save-path policy.
    #[must_use]
    pub fn save_path(mut self, save_path: SavePathFn) -> Self {
        self.save_path = save_path;
        self
    }

    /// Validates the configuration and builds the downloader.
    ///
    /// Must be called within a Tokio runtime: the progress re-render task
    /// and the rate limiter's refill task are spawned here.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an empty base URL, zero concurrency,
    /// a zero request budget, or an invalid header/cookie profile.
    pub fn build(self, sink: Arc<dyn StatusSink>) -> Result<Downloader, ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent,
            });
        }
        // synchronous mode degrades to one worker so files complete in
        // queue order
        let max_concurrent = if self.async_mode {
            self.max_concurrent
        } else {
            1
        };

        let rate_limiter = RateLimiter::new(self.rate_limit)?;
        let client = HttpClient::new(&TransportOptions {
            timeout: self.timeout,
            accept_invalid_certs: self.accept_invalid_certs,
            headers: self.headers,
            cookies: self.cookies,
        })?;

        let progress = Progress::new(sink);
        progress.run(STATUS_INTERVAL);

        debug!(
            base_url = %self.base_url,
            max_concurrent,
            rate_limit = self.rate_limit,
            retries = self.retries,
            "creating downloader"
        );

        Ok(Downloader {
            inner: Arc::new(Inner {
                base_url: self.base_url,
                max_concurrent,
                overwrite: self.overwrite,
                max_size: self.max_size,
                min_size: self.min_size,
                retry: RetryPolicy::new(self.retries, self.retry_interval),
                post_download_delay: self.post_download_delay,
                save_content: self.save_content,
                save_path: self.save_path,
                client,
                rate_limiter,
                progress,
            }),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        })
    }
}

/// The download engine: a bounded worker pool over one post's attachment
/// queue, with global rate limiting, hash-verified skips, and atomic
/// temp-file publication.
pub struct Downloader {
    inner: Arc<Inner>,
    semaphore: Arc<Semaphore>,
}

struct Inner {
    base_url: String,
    max_concurrent: usize,
    overwrite: bool,
    max_size: u64,
    min_size: u64,
    retry: RetryPolicy,
    post_download_delay: Duration,
    save_content: bool,
    save_path: SavePathFn,
    client: HttpClient,
    rate_limiter: RateLimiter,
    progress: Arc<Progress>,
}

/// How one attempt cycle ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The file was streamed and published.
    Downloaded,
    /// The file was deliberately skipped (size out of bounds).
    Cancelled,
}

impl Downloader {
    /// Downloads one post's attachment queue.
    ///
    /// Spawns up to `max_concurrent` workers, attempts every file
    /// independently, and blocks until the whole batch has finished. The
    /// returned channel holds one error per failed file (its capacity is
    /// the batch size, so workers never block on it); drain it to learn
    /// which files failed.
    #[instrument(level = "debug", skip_all, fields(post_id = %post.id, files = files.len()))]
    pub async fn download(
        &self,
        files: Vec<FileWithIndex>,
        creator: &Creator,
        post: &Post,
    ) -> mpsc::Receiver<DownloadError> {
        let (tx, rx) = mpsc::channel(files.len().max(1));
        let creator = Arc::new(creator.clone());
        let post = Arc::new(post.clone());
        let mut handles = Vec::with_capacity(files.len());

        info!(post_id = %post.id, count = files.len(), "downloading post attachments");

        for file in files {
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                warn!("worker semaphore closed unexpectedly");
                break;
            };

            let inner = Arc::clone(&self.inner);
            let creator = Arc::clone(&creator);
            let post = Arc::clone(&post);
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                // permit is released when this task ends (RAII)
                let _permit = permit;

                let url = format!("{}{}", inner.base_url, file.file.url());
                let expected_hash = file.file.hash_token().unwrap_or_default();
                let save_path = (inner.save_path)(&creator, &post, file.index, &file.file);

                if let Err(error) = inner.download_file(&save_path, &url, &expected_hash).await {
                    warn!(url = %url, error = %error, "file download failed");
                    let _ = tx.send(error).await;
                }
            }));
        }
        drop(tx);

        for handle in handles {
            if let Err(error) = handle.await {
                warn!(error = %error, "download task panicked");
            }
        }

        rx
    }

    /// Writes the post's HTML content to `content.html` next to its
    /// files. No-op unless `save_content` was enabled.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::CreateDir`] or [`DownloadError::Io`] when
    /// the post directory or the file cannot be written.
    pub async fn write_content(
        &self,
        creator: &Creator,
        post: &Post,
        content: &str,
    ) -> Result<(), DownloadError> {
        if !self.inner.save_content {
            return Ok(());
        }
        let probe = crate::model::File {
            name: "content.html".to_string(),
            path: "content.html".to_string(),
        };
        let resolved = (self.inner.save_path)(creator, post, 0, &probe);
        let dir = resolved.parent().unwrap_or_else(|| Path::new("."));
        let path = dir.join("content.html");

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|error| DownloadError::create_dir(dir, error))?;
        tokio::fs::write(&path, render_content_page(&post.title, content))
            .await
            .map_err(|error| DownloadError::io(path.clone(), error))
    }

    /// Issues a GET through the configured transport, for callers that
    /// paginate the site API with the same headers, cookies, and pacing
    /// profile.
    ///
    /// # Errors
    ///
    /// Returns the same errors as the transport's GET.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        self.inner.client.get(url).await
    }

    /// The effective worker bound (1 in synchronous mode).
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// The progress reporter, exposed so embedders can observe in-flight
    /// transfers.
    #[must_use]
    pub fn progress(&self) -> &Arc<Progress> {
        &self.inner.progress
    }
}

impl Inner {
    /// Downloads one file to its destination, including the integrity
    /// short-circuit and the retry loop.
    async fn download_file(
        &self,
        path: &Path,
        url: &str,
        expected_hash: &str,
    ) -> Result<(), DownloadError> {
        if !self.overwrite {
            match integrity::file_matches_hash(path, expected_hash).await {
                Ok(true) => {
                    self.progress
                        .print(&format!("file {} already exists, skip", path.display()));
                    return Ok(());
                }
                Ok(false) => {}
                Err(error) => return Err(DownloadError::io(path, error)),
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| DownloadError::create_dir(parent, error))?;
        }

        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            match self.attempt_download(path, url).await {
                Ok(outcome) => {
                    debug!(path = %path.display(), ?outcome, attempt, "attempt finished");
                    tokio::time::sleep(self.post_download_delay).await;
                    return Ok(());
                }
                Err(error) => {
                    if classify_error(&error) == FailureKind::Terminal
                        || attempt >= self.retry.attempts()
                    {
                        return Err(error);
                    }
                    self.progress.print(&format!(
                        "download failed: {error}, retry after {:.1} seconds...",
                        self.retry.interval().as_secs_f64()
                    ));
                    tokio::time::sleep(self.retry.interval()).await;
                }
            }
        }
    }

    /// One attempt: pay the rate limiter, register a fresh bar, stream,
    /// and make sure the bar reaches a terminal state on every path.
    async fn attempt_download(&self, path: &Path, url: &str) -> Result<Outcome, DownloadError> {
        // pacing is per attempt; retries respect the global budget too
        self.rate_limiter.acquire().await;

        let label = path
            .file_name()
            .map_or_else(|| url.to_string(), |n| n.to_string_lossy().into_owned());
        let bar = Arc::new(Bar::new(label, 0, BAR_WIDTH));
        self.progress.add_bar(Arc::clone(&bar));

        let result = self.stream_to_destination(path, url, &bar).await;
        if let Err(error) = &result {
            if !bar.is_done() {
                self.progress.failed(&bar, error);
            }
        }
        result
    }

    async fn stream_to_destination(
        &self,
        path: &Path,
        url: &str,
        bar: &Arc<Bar>,
    ) -> Result<Outcome, DownloadError> {
        let response = self.client.get(url).await?;
        let status = response.status();

        // 429 is retryable upstream; any other non-200 is terminal for
        // this file
        if status != StatusCode::OK {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        if let Some(length) = parse_content_length(&response, url)? {
            bar.set_max(length);
            if length > self.max_size || length < self.min_size {
                self.progress.cancel(bar, "size out of range");
                return Ok(Outcome::Cancelled);
            }
        }

        let tmp_path = temp_path(path);
        if let Err(error) = stream_to_file(response, &tmp_path, bar).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(error);
        }

        // rename, not copy: concurrent readers must never observe a
        // partial file at the destination
        if let Err(error) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(DownloadError::io(path, error));
        }

        self.progress.success(bar);
        Ok(Outcome::Downloaded)
    }
}

/// Streams the response body into the temp file, teeing byte counts into
/// the bar.
async fn stream_to_file(
    response: reqwest::Response,
    tmp_path: &Path,
    bar: &Bar,
) -> Result<(), DownloadError> {
    let url = response.url().to_string();
    let file = tokio::fs::File::create(tmp_path)
        .await
        .map_err(|error| DownloadError::io(tmp_path, error))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| DownloadError::network(&url, error))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|error| DownloadError::io(tmp_path, error))?;
        bar.add(chunk.len() as u64);
    }

    writer
        .flush()
        .await
        .map_err(|error| DownloadError::io(tmp_path, error))
}

fn parse_content_length(
    response: &reqwest::Response,
    url: &str,
) -> Result<Option<u64>, DownloadError> {
    match response.headers().get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| DownloadError::content_length(url)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn render_content_page(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <title>{}</title>\n</head>\n<body>\n    \
         {content}\n</body>\n</html>\n",
        escape_html(title)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
