//! Kemono Download Engine
//!
//! This library provides the download core for kemono-style archive sites:
//! it takes an already-filtered list of post attachments and downloads them
//! to local storage with bounded concurrency, a global request-rate budget,
//! resumable hash-verified skips, and atomic temp-file publication.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`model`] - Creator/post/attachment data model from the remote API
//! - [`download`] - The download pipeline: rate limiter, integrity checker,
//!   retry policy, HTTP transport, and the orchestrating [`Downloader`]
//! - [`progress`] - In-flight transfer tracking rendered through an
//!   injected status sink
//! - [`paths`] - Save-path policy and directory-name sanitization
//!
//! Creator/post discovery, filtering, cookie extraction, and terminal
//! rendering are external collaborators; the engine only consumes their
//! outputs (attachment lists, cookie/header maps, a save-path function,
//! and a [`StatusSink`]).

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod model;
pub mod paths;
pub mod progress;

// Re-export commonly used types
pub use download::{
    ConfigError, DownloadError, Downloader, DownloaderBuilder, FailureKind, RateLimiter,
    RetryPolicy, classify_error,
};
pub use model::{Creator, File, FileWithIndex, Post, add_index_to_attachments};
pub use paths::{SavePathFn, default_save_path};
pub use progress::{Progress, StatusSink};
