//! In-flight transfer tracking and status-line rendering.
//!
//! The [`Progress`] reporter owns the set of active [`Bar`]s behind one
//! mutex and pushes rendered snapshots to an injected [`StatusSink`].
//! Workers never touch the set directly: they increment a bar's byte
//! counter through lock-free atomic adds (the streaming hot path must not
//! contend on the reporter's lock) and hand the bar back through
//! `success`/`failed`/`cancel` at its terminal transition.

pub mod format;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use format::{format_duration, format_size};

const DEEP_RED: &str = "\x1b[38;5;196m";
const RED: &str = "\x1b[38;5;197m";
const GREEN: &str = "\x1b[38;5;106m";
const DEEP_YELLOW: &str = "\x1b[38;5;178m";
const BLUE: &str = "\x1b[38;5;67m";
const PURPLE: &str = "\x1b[38;5;133m";
const GREY: &str = "\x1b[38;5;243m";
const WHITE: &str = "\x1b[38;5;251m";

/// Sink for status output, implemented externally by a terminal renderer.
///
/// `print` appends one permanent line; `set_status` replaces the live
/// multi-line status area with a fresh snapshot.
pub trait StatusSink: Send + Sync {
    fn print(&self, line: &str);
    fn set_status(&self, lines: Vec<String>);
}

/// Terminal state a bar is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarMode {
    Download,
    Cancel,
    Failed,
    Success,
}

impl BarMode {
    fn label(self) -> &'static str {
        match self {
            Self::Download => "Download",
            Self::Cancel => "Cancel",
            Self::Failed => "Failed",
            Self::Success => "Success",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Download => RED,
            Self::Cancel => GREY,
            Self::Failed => DEEP_RED,
            Self::Success => GREEN,
        }
    }
}

/// Mutable record of one in-flight transfer.
///
/// The byte counter is an atomic so the streaming copy can tee into it
/// without synchronization; everything else is written once.
#[derive(Debug)]
pub struct Bar {
    start: Instant,
    label: String,
    max: AtomicU64,
    current: AtomicU64,
    width: usize,
    done: AtomicBool,
}

impl Bar {
    #[must_use]
    pub fn new(label: impl Into<String>, max: u64, width: usize) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
            max: AtomicU64::new(max),
            current: AtomicU64::new(0),
            width,
            done: AtomicBool::new(false),
        }
    }

    /// Adds streamed bytes to the counter. Lock-free; safe to call from
    /// the copy loop while the reporter renders concurrently.
    pub fn add(&self, n: u64) {
        self.current.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_max(&self, max: u64) {
        self.max.store(max, Ordering::Relaxed);
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.done.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    /// Renders the bar as one status line for the given mode.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn render(&self, mode: BarMode) -> String {
        let current = self.current();
        let max = self.max.load(Ordering::Relaxed);
        let percent = if max == 0 {
            0.0
        } else {
            current as f64 / max as f64
        };
        let elapsed = self.start.elapsed();
        let speed = if elapsed.as_secs_f64() > 0.0 {
            (current as f64 / elapsed.as_secs_f64()) as u64
        } else {
            0
        };

        let mut line = String::new();
        line.push_str(DEEP_YELLOW);
        line.push_str(&format!("{:>9}", format_duration(elapsed)));
        line.push(' ');
        line.push_str(WHITE);
        line.push_str(&format!("{:>8}", mode.label()));
        line.push(' ');

        let mut completed = (percent * self.width as f64) as usize;
        completed = completed.min(self.width);
        line.push_str(mode.color());
        for _ in 0..completed {
            line.push('━');
        }
        if mode == BarMode::Download {
            line.push_str(GREY);
            if completed > 0 && completed < self.width {
                completed += 1;
                line.push('╺');
            }
        }
        for _ in completed..self.width {
            line.push('━');
        }

        line.push(' ');
        line.push_str(PURPLE);
        line.push_str(&format!("{:5.1}%", percent * 100.0));
        line.push(' ');
        line.push_str(BLUE);
        line.push_str(&format!("{:>10}/s", format_size(speed)));
        line.push(' ');
        line.push_str(WHITE);
        line.push_str(&format!("{:>9}", format_size(max)));
        line.push(' ');
        line.push_str(GREY);
        line.push_str(&self.label);
        line
    }
}

/// Tracks the set of concurrently in-flight transfers and renders them
/// through the sink.
pub struct Progress {
    bars: Mutex<Vec<Arc<Bar>>>,
    sink: Arc<dyn StatusSink>,
}

impl Progress {
    #[must_use]
    pub fn new(sink: Arc<dyn StatusSink>) -> Arc<Self> {
        Arc::new(Self {
            bars: Mutex::new(Vec::new()),
            sink,
        })
    }

    /// Starts the periodic re-render task so live throughput updates even
    /// without state transitions. The task holds a weak reference and
    /// exits once the reporter is dropped.
    pub fn run(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(progress) = weak.upgrade() else {
                    break;
                };
                progress.push_status();
            }
        });
    }

    pub fn add_bar(&self, bar: Arc<Bar>) {
        self.lock_bars().push(bar);
    }

    /// Removes a bar from the active set. Tolerates bars that were never
    /// added or were already removed.
    pub fn remove_bar(&self, bar: &Arc<Bar>) {
        self.lock_bars().retain(|b| !Arc::ptr_eq(b, bar));
    }

    /// Number of transfers currently in flight.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock_bars().len()
    }

    /// Marks a transfer complete: the bar leaves the active set exactly
    /// once and a success line is printed.
    pub fn success(&self, bar: &Arc<Bar>) {
        bar.finish();
        self.remove_bar(bar);
        self.push_status();
        self.sink.print(&bar.render(BarMode::Success));
    }

    pub fn failed(&self, bar: &Arc<Bar>, detail: &dyn fmt::Display) {
        bar.finish();
        self.remove_bar(bar);
        self.push_status();
        self.sink.print(&bar.render(BarMode::Failed));
        self.sink.print(&format!("{DEEP_RED}{detail}"));
    }

    /// Marks a transfer as deliberately skipped (e.g. size out of range),
    /// rendered distinctly from a failure.
    pub fn cancel(&self, bar: &Arc<Bar>, reason: &str) {
        bar.finish();
        self.remove_bar(bar);
        self.push_status();
        self.sink.print(&bar.render(BarMode::Cancel));
        self.sink.print(&format!("{DEEP_RED}{reason}"));
    }

    /// Recomputes the multi-line snapshot of all active bars and pushes
    /// it to the sink.
    pub fn push_status(&self) {
        let lines: Vec<String> = {
            let bars = self.lock_bars();
            bars.iter().map(|b| b.render(BarMode::Download)).collect()
        };
        let lines = if lines.is_empty() {
            vec![String::new()]
        } else {
            lines
        };
        self.sink.set_status(lines);
    }

    /// Prints one permanent log line through the sink.
    pub fn print(&self, line: &str) {
        self.sink.print(line);
    }

    fn lock_bars(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Bar>>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
