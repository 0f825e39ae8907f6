//! Human-readable size and duration formatting for status lines.

use std::time::Duration;

const KB: u64 = 1 << 10;
const MB: u64 = 1 << 20;
const GB: u64 = 1 << 30;

/// Formats a byte count as `B`/`KB`/`MB`/`GB` with two decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(size: u64) -> String {
    match size {
        s if s >= GB => format!("{:.2} GB", s as f64 / GB as f64),
        s if s >= MB => format!("{:.2} MB", s as f64 / MB as f64),
        s if s >= KB => format!("{:.2} KB", s as f64 / KB as f64),
        s => format!("{s} B"),
    }
}

/// Formats an elapsed duration compactly: `12.34ms`, `5.67s`, `01m02.00s`,
/// `01h02.50m`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos() as f64;
    const SECOND: f64 = 1e9;
    const MINUTE: f64 = 60.0 * SECOND;
    const HOUR: f64 = 60.0 * MINUTE;

    if nanos >= HOUR {
        format!(
            "{:02}h{:05.2}m",
            (nanos / HOUR) as u64,
            (nanos % HOUR) / MINUTE
        )
    } else if nanos >= MINUTE {
        format!(
            "{:02}m{:05.2}s",
            (nanos / MINUTE) as u64,
            (nanos % MINUTE) / SECOND
        )
    } else if nanos >= SECOND {
        format!("{:.2}s", nanos / SECOND)
    } else {
        format!("{:.2}ms", nanos / 1e6)
    }
}
