//! Retry policy and failure classification for transient download errors.
//!
//! Failed attempts are classified into [`FailureKind::Retryable`]
//! (network-level failures, HTTP 429, interrupted streams) and
//! [`FailureKind::Terminal`] (everything a retry cannot fix). Retryable
//! failures are re-attempted after a fixed configured interval until the
//! budget runs out; exhaustion converts the last error into the file's
//! terminal error.

use std::time::Duration;

use super::constants::DEFAULT_RETRIES;
use super::error::DownloadError;

/// Retry configuration: a bounded count with a fixed delay.
///
/// `retries = 0` means exactly one attempt. The interval may be zero for
/// immediate retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    retries: u32,
    interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            interval: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(retries: u32, interval: Duration) -> Self {
        Self { retries, interval }
    }

    /// Total attempts allowed: the initial attempt plus the retries.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay between attempts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// May succeed on a later attempt (network failures, server-side
    /// rate limiting, interrupted streams).
    Retryable,
    /// Retrying cannot help; report the error and move on.
    Terminal,
}

/// Classifies a download error for the retry loop.
///
/// | Error | Kind | Rationale |
/// |-------|------|-----------|
/// | Network | Retryable | connection may recover |
/// | Timeout | Retryable | transient congestion |
/// | HTTP 429 | Retryable | server throttling, backs off |
/// | other HTTP status | Terminal | the resource state won't change |
/// | Io | Retryable | interrupted stream, fresh attempt re-writes |
/// | InvalidUrl | Terminal | malformed input |
/// | ContentLength | Terminal | malformed response metadata |
/// | CreateDir | Terminal | filesystem errors are not transient |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureKind {
    match error {
        DownloadError::Network { .. } | DownloadError::Timeout { .. } | DownloadError::Io { .. } => {
            FailureKind::Retryable
        }
        DownloadError::HttpStatus { status: 429, .. } => FailureKind::Retryable,
        DownloadError::HttpStatus { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::ContentLength { .. }
        | DownloadError::CreateDir { .. } => FailureKind::Terminal,
    }
}
