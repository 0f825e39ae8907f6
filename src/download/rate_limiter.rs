//! Global request-rate budget for outbound downloads.
//!
//! Every outbound request acquires one permit; the pool is restored to
//! full capacity once per second by a background task. The refill is a
//! reset-to-full, not an additive trickle, so admission is bursty at each
//! window boundary and then stalls until the next tick - this mirrors how
//! the target sites' abuse protection is best survived in practice and is
//! part of the limiter's contract.
//!
//! # Example
//!
//! ```no_run
//! use kemono_dl::RateLimiter;
//!
//! # async fn example() -> Result<(), kemono_dl::ConfigError> {
//! let limiter = RateLimiter::new(2)?;
//! limiter.acquire().await; // immediate
//! limiter.acquire().await; // immediate
//! limiter.acquire().await; // blocks until the next one-second tick
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use super::error::ConfigError;

/// Token bucket releasing `rate` permits per second.
///
/// Internally synchronized; share it across workers behind an `Arc` (or
/// through the [`Downloader`](super::Downloader), which owns one).
///
/// Must be constructed within a Tokio runtime: the refill task is spawned
/// at construction. It holds only weak references, so dropping the
/// limiter stops it.
#[derive(Debug)]
pub struct RateLimiter {
    rate: usize,
    semaphore: Arc<Semaphore>,
    consumed: Arc<AtomicUsize>,
}

impl RateLimiter {
    /// Creates a limiter admitting `permits_per_second` requests per
    /// second and starts its refill task.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRate`] when `permits_per_second` is
    /// zero - a budget that admits nothing would deadlock every worker.
    pub fn new(permits_per_second: usize) -> Result<Self, ConfigError> {
        if permits_per_second == 0 {
            return Err(ConfigError::InvalidRate {
                value: permits_per_second,
            });
        }

        debug!(permits_per_second, "creating rate limiter");

        let semaphore = Arc::new(Semaphore::new(permits_per_second));
        let consumed = Arc::new(AtomicUsize::new(0));

        let weak_semaphore = Arc::downgrade(&semaphore);
        let weak_consumed = Arc::downgrade(&consumed);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            // the first tick completes immediately; the pool starts full
            tick.tick().await;
            loop {
                tick.tick().await;
                let (Some(semaphore), Some(consumed)) =
                    (weak_semaphore.upgrade(), weak_consumed.upgrade())
                else {
                    break;
                };
                // restore everything consumed since the last tick,
                // resetting the pool to full capacity
                semaphore.add_permits(consumed.swap(0, Ordering::SeqCst));
            }
        });

        Ok(Self {
            rate: permits_per_second,
            semaphore,
            consumed,
        })
    }

    /// Blocks until a permit is available, then consumes it.
    pub async fn acquire(&self) {
        // the semaphore is never closed, so acquire cannot fail
        if let Ok(permit) = self.semaphore.acquire().await {
            self.consumed.fetch_add(1, Ordering::SeqCst);
            permit.forget();
        }
    }

    /// Returns the configured permits-per-second budget.
    #[must_use]
    pub fn rate(&self) -> usize {
        self.rate
    }
}
