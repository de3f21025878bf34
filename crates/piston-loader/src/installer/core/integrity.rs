use crate::error::{InstallError, IoResultExt, Result};
use md5::Md5;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::path::Path;
use tokio::io::AsyncReadExt;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Md5,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Md5 => "md5",
        }
    }
}

async fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await.with_path(path)?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).await.with_path(path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Lowercase hex digest of a file, read in fixed-size chunks.
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    match algorithm {
        HashAlgorithm::Sha1 => digest_file::<Sha1>(path).await,
        HashAlgorithm::Sha256 => digest_file::<Sha256>(path).await,
        HashAlgorithm::Md5 => digest_file::<Md5>(path).await,
    }
}

/// Whether the file at `path` hashes to `expected` (case-insensitive).
pub async fn verify(path: &Path, expected: &str, algorithm: HashAlgorithm) -> Result<bool> {
    let actual = hash_file(path, algorithm).await?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}

/// Like [`verify`], but deletes the file and fails with `Integrity` on mismatch.
pub async fn verify_or_remove(path: &Path, expected: &str, algorithm: HashAlgorithm) -> Result<()> {
    let actual = hash_file(path, algorithm).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        log::debug!("{} validated for {:?}", algorithm.as_str(), path);
        return Ok(());
    }

    log::warn!(
        "{} mismatch for {:?} ({} != {}), removing",
        algorithm.as_str(),
        path,
        actual,
        expected
    );
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to remove corrupt file {:?}: {}", path, e);
    }
    Err(InstallError::Integrity {
        path: path.to_path_buf(),
        algorithm: algorithm.as_str(),
        expected: expected.to_string(),
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // sha1("hello world")
    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    #[tokio::test]
    async fn verify_matches_known_digests() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        assert!(verify(&path, HELLO_SHA1, HashAlgorithm::Sha1).await.unwrap());
        assert!(verify(&path, &HELLO_MD5.to_uppercase(), HashAlgorithm::Md5).await.unwrap());
        assert!(verify(
            &path,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            HashAlgorithm::Sha256
        )
        .await
        .unwrap());
    }

    #[tokio::test]
    async fn single_byte_mutation_fails_and_removes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        tokio::fs::write(&path, b"hello worle").await.unwrap();

        assert!(!verify(&path, HELLO_SHA1, HashAlgorithm::Sha1).await.unwrap());

        let err = verify_or_remove(&path, HELLO_SHA1, HashAlgorithm::Sha1)
            .await
            .unwrap_err();
        match err {
            InstallError::Integrity {
                algorithm, expected, ..
            } => {
                assert_eq!(algorithm, "sha1");
                assert_eq!(expected, HELLO_SHA1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn hashing_spans_multiple_buffers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![7u8; HASH_BUFFER_SIZE * 3 + 11];
        tokio::fs::write(&path, &data).await.unwrap();

        let mut hasher = Sha1::new();
        hasher.update(&data);
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(hash_file(&path, HashAlgorithm::Sha1).await.unwrap(), expected);
        assert_eq!(expected.len(), 40);
    }

    #[tokio::test]
    async fn digests_are_lowercase_fixed_width_hex() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let sha256 = hash_file(&path, HashAlgorithm::Sha256).await.unwrap();
        assert_eq!(sha256.len(), 64);
        assert_eq!(hash_file(&path, HashAlgorithm::Md5).await.unwrap(), HELLO_MD5);
        assert_eq!(hash_file(&path, HashAlgorithm::Sha1).await.unwrap(), HELLO_SHA1);
    }
}
