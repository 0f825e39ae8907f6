//! The attachment download pipeline.
//!
//! This module provides the load-bearing half of the crate: a global
//! [`RateLimiter`] pacing every outbound request, an integrity check that
//! lets verified files skip the network entirely, a retrying single-file
//! streamer that publishes through temp-file + atomic rename, and the
//! [`Downloader`] orchestrator fanning a post's attachment queue out to a
//! bounded worker pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kemono_dl::{DownloaderBuilder, StatusSink};
//!
//! struct StdoutSink;
//! impl StatusSink for StdoutSink {
//!     fn print(&self, line: &str) {
//!         println!("{line}");
//!     }
//!     fn set_status(&self, _lines: Vec<String>) {}
//! }
//!
//! # async fn example() -> Result<(), kemono_dl::ConfigError> {
//! let downloader = DownloaderBuilder::new()
//!     .base_url("https://kemono.example")
//!     .async_mode(true)
//!     .rate_limit(2)
//!     .retries(2)
//!     .build(Arc::new(StdoutSink))?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
pub mod integrity;
pub mod rate_limiter;
mod retry;

pub use client::{HttpClient, TransportOptions};
pub use engine::{Downloader, DownloaderBuilder};
pub use error::{ConfigError, DownloadError};
pub use rate_limiter::RateLimiter;
pub use retry::{FailureKind, RetryPolicy, classify_error};
