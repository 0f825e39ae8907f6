//! Completeness check for previously-downloaded files.
//!
//! Archive paths embed the attachment's SHA-256, so a file on disk whose
//! digest matches the token in its remote path is already complete and
//! can be skipped without a network call. The digest is computed over a
//! streamed read; files are never loaded into memory whole.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

const HASH_BUF_SIZE: usize = 64 * 1024;

/// Returns whether the file at `path` exists and its SHA-256 matches
/// `expected` (hex, case-insensitive).
///
/// A missing file is `Ok(false)`, not an error. An empty `expected` is
/// always `Ok(false)`: without a reference hash completeness cannot be
/// verified, so the file is conservatively re-downloaded.
///
/// # Errors
///
/// Returns the underlying IO error when the file exists but cannot be
/// opened or read.
pub async fn file_matches_hash(path: &Path, expected: &str) -> Result<bool, std::io::Error> {
    if expected.is_empty() {
        return Ok(false);
    }

    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };

    let digest = hash_reader(file).await?;
    let matches = digest.eq_ignore_ascii_case(expected);
    debug!(path = %path.display(), matches, "verified existing file");
    Ok(matches)
}

/// Streams a reader through SHA-256 and returns the lowercase hex digest.
async fn hash_reader<R>(mut reader: R) -> Result<String, std::io::Error>
where
    R: AsyncReadExt + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; HASH_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[tokio::test]
    async fn test_missing_file_is_incomplete_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let result = file_matches_hash(&path, &sha256_hex(b"anything")).await;
        assert!(matches!(result, Ok(false)));
    }

    #[tokio::test]
    async fn test_empty_expected_hash_forces_redownload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("present.bin");
        std::fs::write(&path, b"content").unwrap();
        let result = file_matches_hash(&path, "").await;
        assert!(matches!(result, Ok(false)));
    }

    #[tokio::test]
    async fn test_matching_content_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("present.bin");
        std::fs::write(&path, b"the full attachment body").unwrap();
        let expected = sha256_hex(b"the full attachment body");
        assert!(file_matches_hash(&path, &expected).await.unwrap());
    }

    #[tokio::test]
    async fn test_matching_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("present.bin");
        std::fs::write(&path, b"abc").unwrap();
        let expected = sha256_hex(b"abc").to_uppercase();
        assert!(file_matches_hash(&path, &expected).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_content_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("present.bin");
        std::fs::write(&path, b"truncated partial wri").unwrap();
        let expected = sha256_hex(b"the full attachment body");
        assert!(!file_matches_hash(&path, &expected).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_reader_streams_large_input() {
        // larger than one hash buffer to exercise the chunked loop
        let data = vec![0xAB_u8; HASH_BUF_SIZE * 2 + 17];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.bin");
        std::fs::write(&path, &data).unwrap();
        assert!(file_matches_hash(&path, &sha256_hex(&data)).await.unwrap());
    }
}
