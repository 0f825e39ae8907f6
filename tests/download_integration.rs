//! Integration tests for the download engine.
//!
//! These tests verify the full pipeline against mock HTTP servers:
//! atomic publication, hash-verified skips, partial-failure isolation,
//! size-bound cancellation, retry budgets, and the concurrency bound.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kemono_dl::{
    Creator, DownloaderBuilder, File, FileWithIndex, Post, SavePathFn, StatusSink,
};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sink that records everything pushed through it.
#[derive(Default)]
struct RecordingSink {
    printed: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn printed(&self) -> Vec<String> {
        self.printed.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn print(&self, line: &str) {
        self.printed.lock().unwrap().push(line.to_string());
    }

    fn set_status(&self, _lines: Vec<String>) {}
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Save-path policy used by the tests: flatten every attachment into the
/// temp dir under its remote basename.
fn flat_save_path(dir: &Path) -> SavePathFn {
    let dir = dir.to_path_buf();
    Arc::new(move |_creator: &Creator, _post: &Post, _index: usize, file: &File| {
        dir.join(file.path.rsplit('/').next().unwrap_or("file"))
    })
}

/// Builder tuned for fast tests: no courtesy delay, immediate retries,
/// and a rate budget far above what any test consumes in a second.
fn test_builder(base_url: &str, dir: &Path) -> DownloaderBuilder {
    DownloaderBuilder::new()
        .base_url(base_url)
        .async_mode(true)
        .rate_limit(1000)
        .retry_interval(Duration::ZERO)
        .post_download_delay(Duration::ZERO)
        .timeout(Duration::from_secs(5))
        .save_path(flat_save_path(dir))
}

fn attachment(remote_path: &str) -> FileWithIndex {
    File {
        name: remote_path
            .rsplit('/')
            .next()
            .unwrap_or("file")
            .to_string(),
        path: remote_path.to_string(),
    }
    .with_index(0)
}

fn creator_and_post() -> (Creator, Post) {
    let creator = Creator::new("patreon", "123");
    let post = Post {
        id: "p1".to_string(),
        title: "test post".to_string(),
        ..Post::default()
    };
    (creator, post)
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<kemono_dl::DownloadError>) -> Vec<String> {
    let mut errors = Vec::new();
    while let Some(error) = rx.recv().await {
        errors.push(error.to_string());
    }
    errors
}

fn assert_no_temp_files(dir: &Path) {
    let leftovers: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[tokio::test]
async fn test_download_full_flow_preserves_content() {
    let mock_server = MockServer::start().await;
    let body = b"This is the complete attachment body.\nLine 2.\n";
    Mock::given(method("GET"))
        .and(path("/f/one.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = test_builder(&mock_server.uri(), dir.path())
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment("/f/one.bin")], &creator, &post)
        .await;

    assert!(drain(rx).await.is_empty());
    let saved = std::fs::read(dir.path().join("one.bin")).unwrap();
    assert_eq!(saved, body);
    assert_no_temp_files(dir.path());
}

#[tokio::test]
async fn test_existing_complete_file_is_skipped() {
    let mock_server = MockServer::start().await;
    let body = b"already archived bytes";
    let hash = sha256_hex(body);
    let remote_path = format!("/aa/bb/{hash}.bin");

    // exactly one network hit across two download calls
    Mock::given(method("GET"))
        .and(path(remote_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let downloader = test_builder(&mock_server.uri(), dir.path())
        .build(Arc::clone(&sink) as Arc<dyn StatusSink>)
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment(&remote_path)], &creator, &post)
        .await;
    assert!(drain(rx).await.is_empty());

    let rx = downloader
        .download(vec![attachment(&remote_path)], &creator, &post)
        .await;
    assert!(drain(rx).await.is_empty());

    assert!(
        sink.printed().iter().any(|l| l.contains("skip")),
        "second pass should log the skip"
    );
}

#[tokio::test]
async fn test_stale_file_is_redownloaded() {
    let mock_server = MockServer::start().await;
    let body = b"fresh attachment content";
    let hash = sha256_hex(body);
    let remote_path = format!("/aa/bb/{hash}.bin");

    Mock::given(method("GET"))
        .and(path(remote_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join(format!("{hash}.bin"));
    std::fs::write(&dest, b"stale partial write").unwrap();

    let downloader = test_builder(&mock_server.uri(), dir.path())
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment(&remote_path)], &creator, &post)
        .await;

    assert!(drain(rx).await.is_empty());
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn test_partial_failure_isolation() {
    let mock_server = MockServer::start().await;
    let names = ["a", "b", "c", "d", "e"];
    for name in names {
        let template = if name == "c" {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_bytes(format!("body of {name}").into_bytes())
        };
        Mock::given(method("GET"))
            .and(path(format!("/f/{name}.bin")))
            .respond_with(template)
            .mount(&mock_server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let downloader = test_builder(&mock_server.uri(), dir.path())
        .max_concurrent(3)
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    let files = names
        .iter()
        .map(|name| attachment(&format!("/f/{name}.bin")))
        .collect();
    let rx = downloader.download(files, &creator, &post).await;

    let errors = drain(rx).await;
    assert_eq!(errors.len(), 1, "exactly one file should fail: {errors:?}");
    assert!(errors[0].contains("500"));

    for name in names {
        let dest = dir.path().join(format!("{name}.bin"));
        if name == "c" {
            assert!(!dest.exists(), "failed file must not be published");
        } else {
            assert_eq!(
                std::fs::read(&dest).unwrap(),
                format!("body of {name}").into_bytes()
            );
        }
    }
}

#[tokio::test]
async fn test_oversize_file_is_cancelled_not_failed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/f/huge.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0_u8; 4096]))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let downloader = test_builder(&mock_server.uri(), dir.path())
        .max_size(1024)
        .build(Arc::clone(&sink) as Arc<dyn StatusSink>)
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment("/f/huge.bin")], &creator, &post)
        .await;

    assert!(
        drain(rx).await.is_empty(),
        "a size-bound skip is not an error"
    );
    assert!(!dir.path().join("huge.bin").exists());
    assert_no_temp_files(dir.path());
    assert!(
        sink.printed()
            .iter()
            .any(|l| l.contains("size out of range")),
        "cancellation should be reported distinctly"
    );
}

#[tokio::test]
async fn test_undersize_file_is_cancelled() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/f/tiny.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0_u8; 10]))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = test_builder(&mock_server.uri(), dir.path())
        .min_size(1024)
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment("/f/tiny.bin")], &creator, &post)
        .await;

    assert!(drain(rx).await.is_empty());
    assert!(!dir.path().join("tiny.bin").exists());
}

#[tokio::test]
async fn test_retry_exhaustion_counts_attempts() {
    let mock_server = MockServer::start().await;
    // retries = 2 means exactly three attempts total
    Mock::given(method("GET"))
        .and(path("/f/throttled.bin"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = test_builder(&mock_server.uri(), dir.path())
        .retries(2)
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment("/f/throttled.bin")], &creator, &post)
        .await;

    let errors = drain(rx).await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("429"), "got: {}", errors[0]);
}

#[tokio::test]
async fn test_non_retryable_status_is_attempted_once() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/f/gone.bin"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let downloader = test_builder(&mock_server.uri(), dir.path())
        .retries(5)
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment("/f/gone.bin")], &creator, &post)
        .await;

    let errors = drain(rx).await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("404"));
}

#[tokio::test]
async fn test_failed_download_leaves_previous_version_untouched() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/f/keep.bin"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("keep.bin");
    std::fs::write(&dest, b"previous version").unwrap();

    let downloader = test_builder(&mock_server.uri(), dir.path())
        .overwrite(true)
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment("/f/keep.bin")], &creator, &post)
        .await;

    assert_eq!(drain(rx).await.len(), 1);
    assert_eq!(std::fs::read(&dest).unwrap(), b"previous version");
    assert_no_temp_files(dir.path());
}

/// Serves a response that announces 100 bytes but closes the connection
/// after a few, so the body stream fails mid-flight.
async fn spawn_truncating_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0_u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\npartial")
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_interrupted_stream_never_publishes_destination() {
    let base_url = spawn_truncating_server().await;

    let dir = TempDir::new().unwrap();
    let downloader = test_builder(&base_url, dir.path())
        .retries(1)
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    let rx = downloader
        .download(vec![attachment("/f/cut.bin")], &creator, &post)
        .await;

    let errors = drain(rx).await;
    assert_eq!(errors.len(), 1, "truncated stream must surface an error");
    assert!(
        !dir.path().join("cut.bin").exists(),
        "destination must never hold a partial file"
    );
    assert_no_temp_files(dir.path());
}

#[tokio::test]
async fn test_concurrency_stays_within_bound() {
    let mock_server = MockServer::start().await;
    for i in 0..6 {
        Mock::given(method("GET"))
            .and(path(format!("/f/par{i}.bin")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1_u8; 256])
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&mock_server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let downloader = test_builder(&mock_server.uri(), dir.path())
        .max_concurrent(2)
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    // observe the active-bar set while the batch runs
    let progress = Arc::clone(downloader.progress());
    let max_seen = Arc::new(AtomicUsize::new(0));
    let watcher = {
        let max_seen = Arc::clone(&max_seen);
        tokio::spawn(async move {
            loop {
                max_seen.fetch_max(progress.active_count(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    let files = (0..6)
        .map(|i| attachment(&format!("/f/par{i}.bin")))
        .collect();
    let rx = downloader.download(files, &creator, &post).await;
    watcher.abort();

    assert!(drain(rx).await.is_empty());
    let observed = max_seen.load(Ordering::SeqCst);
    assert!(
        observed <= 2,
        "no more than two transfers may be in flight, saw {observed}"
    );
    assert!(observed >= 1, "watcher should have seen at least one transfer");
}

#[tokio::test]
async fn test_write_content_renders_post_page() {
    let dir = TempDir::new().unwrap();
    let downloader = test_builder("https://unused.example", dir.path())
        .save_content(true)
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    downloader
        .write_content(&creator, &post, "<p>update text</p>")
        .await
        .unwrap();

    let html = std::fs::read_to_string(dir.path().join("content.html")).unwrap();
    assert!(html.contains("<title>test post</title>"));
    assert!(html.contains("<p>update text</p>"));
}

#[tokio::test]
async fn test_write_content_disabled_is_noop() {
    let dir = TempDir::new().unwrap();
    let downloader = test_builder("https://unused.example", dir.path())
        .build(Arc::new(RecordingSink::default()))
        .unwrap();
    let (creator, post) = creator_and_post();

    downloader
        .write_content(&creator, &post, "<p>ignored</p>")
        .await
        .unwrap();

    assert!(!dir.path().join("content.html").exists());
}
