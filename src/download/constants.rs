//! Constants for the download module (defaults, header profile).

use std::time::Duration;

/// Default number of concurrent download workers.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default global request budget (permits per second).
pub const DEFAULT_RATE_LIMIT: usize = 2;

/// Default per-attempt request timeout (5 minutes for large files).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default retry budget for transient failures (attempts = retries + 1).
pub const DEFAULT_RETRIES: u32 = 2;

/// Default courtesy pause after each completed file, on top of the rate
/// limiter. The target sites throttle aggressively; spacing downloads out
/// keeps long batches alive.
pub const DEFAULT_POST_DOWNLOAD_DELAY: Duration = Duration::from_secs(1);

/// Connection-pool cap per host.
pub const MAX_CONNECTIONS: usize = 100;

/// Rendered width of a progress bar, in glyphs.
pub const BAR_WIDTH: usize = 30;

/// Interval between live status re-renders.
pub const STATUS_INTERVAL: Duration = Duration::from_millis(100);

/// Browser-profile request headers sent by default.
///
/// `Accept-Encoding` is deliberately absent: reqwest negotiates gzip and
/// decodes transparently when the header is left to it.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
    image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7";
pub const SEC_CH_UA: &str =
    "\"Google Chrome\";v=\"111\", \"Not(A:Brand\";v=\"8\", \"Chromium\";v=\"111\"";
pub const SEC_CH_UA_MOBILE: &str = "?0";
pub const SEC_FETCH_DEST: &str = "document";
pub const SEC_FETCH_MODE: &str = "navigate";
pub const SEC_FETCH_SITE: &str = "none";
pub const SEC_FETCH_USER: &str = "?1";
pub const UPGRADE_INSECURE_REQUESTS: &str = "1";

/// Default header set attached to every request.
#[must_use]
pub fn default_headers() -> Vec<(String, String)> {
    [
        ("User-Agent", USER_AGENT),
        ("Accept", ACCEPT),
        ("Accept-Language", ACCEPT_LANGUAGE),
        ("Sec-Ch-Ua", SEC_CH_UA),
        ("Sec-Ch-Ua-Mobile", SEC_CH_UA_MOBILE),
        ("Sec-Fetch-Dest", SEC_FETCH_DEST),
        ("Sec-Fetch-Mode", SEC_FETCH_MODE),
        ("Sec-Fetch-Site", SEC_FETCH_SITE),
        ("Sec-Fetch-User", SEC_FETCH_USER),
        ("Upgrade-Insecure-Requests", UPGRADE_INSECURE_REQUESTS),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
