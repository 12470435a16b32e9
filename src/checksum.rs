//! SHA-256 checksum manifests and file verification.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{InstallError, InstallResult};

const DIGEST_HEX_LEN: usize = 64;
const READ_BUF_SIZE: usize = 64 * 1024;

/// One `<digest> <filename>` line of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub digest: String,
    pub filename: String,
}

impl ChecksumRecord {
    /// Parse a manifest line.
    ///
    /// Returns `None` for lines that are blank, have fewer than two fields,
    /// or whose digest is not exactly 64 hex characters.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let digest = fields.next()?;
        let filename = fields.next()?;

        if !is_sha256_hex(digest) {
            return None;
        }

        Some(Self {
            digest: digest.to_string(),
            filename: filename.strip_prefix('*').unwrap_or(filename).to_string(),
        })
    }
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// All valid records in a manifest, in file order.
pub fn parse_manifest(manifest: &str) -> Vec<ChecksumRecord> {
    manifest.lines().filter_map(ChecksumRecord::parse).collect()
}

/// Look up the digest for `filename` in a manifest body.
pub fn find_checksum(manifest: &str, filename: &str) -> InstallResult<String> {
    manifest
        .lines()
        .filter_map(ChecksumRecord::parse)
        .find(|record| record.filename == filename)
        .map(|record| record.digest)
        .ok_or_else(|| InstallError::ChecksumNotFound {
            filename: filename.to_string(),
        })
}

/// Hex-encoded SHA-256 of a file, streamed in fixed-size chunks.
pub async fn sha256_file(path: &Path) -> InstallResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| InstallError::io_at("open", path, e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| InstallError::io_at("read", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file against an expected hex digest (case-insensitive).
pub async fn verify_file(path: &Path, expected: &str) -> InstallResult<()> {
    let actual = sha256_file(path).await?;
    let expected = expected.trim();

    if !actual.eq_ignore_ascii_case(expected) {
        tracing::warn!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
        return Err(InstallError::ChecksumMismatch {
            expected: expected.to_ascii_lowercase(),
            actual,
        });
    }

    tracing::debug!("Checksum verified for {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn manifest() -> String {
        format!(
            "{}  node-v22.13.1-x64.msi\n\n{} *node-v22.13.1-x86.msi\n{}  node-v22.13.1-arm64.msi\n",
            "a".repeat(64),
            "B".repeat(64),
            "0123456789abcdef".repeat(4),
        )
    }

    #[test]
    fn test_find_each_listed_file() {
        let m = manifest();
        assert_eq!(find_checksum(&m, "node-v22.13.1-x64.msi").unwrap(), "a".repeat(64));
        assert_eq!(find_checksum(&m, "node-v22.13.1-x86.msi").unwrap(), "B".repeat(64));
        assert_eq!(
            find_checksum(&m, "node-v22.13.1-arm64.msi").unwrap(),
            "0123456789abcdef".repeat(4)
        );
    }

    #[test]
    fn test_star_prefix_matches_bare_filename() {
        let m = manifest();
        assert!(find_checksum(&m, "node-v22.13.1-x86.msi").is_ok());
        assert!(find_checksum(&m, "*node-v22.13.1-x86.msi").is_err());
    }

    #[test]
    fn test_absent_filename_not_found() {
        let err = find_checksum(&manifest(), "node-v22.13.1-x64.zip").unwrap_err();
        assert!(matches!(err, InstallError::ChecksumNotFound { .. }));

        let err = find_checksum("", "anything").unwrap_err();
        assert!(matches!(err, InstallError::ChecksumNotFound { .. }));
    }

    #[test]
    fn test_short_or_non_hex_digest_never_matches() {
        let m = format!("abc123  short.msi\n{}  nonhex.msi\n", "g".repeat(64));
        assert!(find_checksum(&m, "short.msi").is_err());
        assert!(find_checksum(&m, "nonhex.msi").is_err());
    }

    #[test]
    fn test_parse_manifest_skips_garbage_lines() {
        let m = format!("garbage\n\n{}  ok.exe\nonly-one-field\n", "c".repeat(64));
        let records = parse_manifest(&m);
        assert_eq!(
            records,
            vec![ChecksumRecord {
                digest: "c".repeat(64),
                filename: "ok.exe".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_hello_world_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(sha256_file(&path).await.unwrap(), HELLO_WORLD_SHA256);
        verify_file(&path, HELLO_WORLD_SHA256).await.unwrap();
        verify_file(&path, &HELLO_WORLD_SHA256.to_uppercase())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let err = verify_file(&path, &"0".repeat(64)).await.unwrap_err();
        assert!(matches!(err, InstallError::ChecksumMismatch { .. }));
        assert!(err.is_integrity());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = verify_file(&dir.path().join("nope.bin"), HELLO_WORLD_SHA256)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Io { .. }));
    }
}
