use crate::error::{InstallError, IoResultExt, Result};
use crate::installer::config::PROBE_TIMEOUT_SECS;
use crate::installer::core::integrity::{verify_or_remove, HashAlgorithm};
use crate::installer::types::{InstallEvent, ProgressReporter};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// A reachable remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: String,
    pub size: u64,
}

/// One file of a download batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub folder: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub sha1: Option<String>,
    pub label: String,
}

impl DownloadTask {
    pub fn destination(&self) -> PathBuf {
        self.folder.join(&self.file_name)
    }
}

/// HEAD `url`; the advertised size when it answers 200 with a positive length.
pub async fn probe(client: &Client, url: &str) -> Option<u64> {
    let response = match client
        .head(url)
        .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            log::debug!("Probe failed for {}: {}", url, e);
            return None;
        }
    };

    if response.status() != StatusCode::OK {
        log::debug!("Probe {} answered {}", url, response.status());
        return None;
    }

    // content_length() reflects the (empty) body of a HEAD response, so read the header.
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|size| *size > 0)
}

/// Find a source for `relative_path`: the direct URL first, then each mirror in order.
pub async fn resolve(
    client: &Client,
    direct_url: Option<&str>,
    relative_path: &str,
    mirrors: &[String],
) -> Option<RemoteFile> {
    if let Some(url) = direct_url {
        if let Some(size) = probe(client, url).await {
            return Some(RemoteFile {
                url: url.to_string(),
                size,
            });
        }
        log::debug!("Direct URL {} unusable, trying mirrors", url);
    }

    for mirror in mirrors {
        let url = format!("{}/{}", mirror.trim_end_matches('/'), relative_path);
        if let Some(size) = probe(client, &url).await {
            log::debug!("Resolved {} via mirror {}", relative_path, mirror);
            return Some(RemoteFile { url, size });
        }
    }

    log::warn!("No source found for {}", relative_path);
    None
}

/// Stream `url` into `dest`.
///
/// Bytes land in `<dest>.part` and are moved into place only after the
/// optional checksum matches. `on_chunk` receives the length of every chunk.
pub async fn download_file(
    client: &Client,
    url: &str,
    dest: &Path,
    checksum: Option<(&str, HashAlgorithm)>,
    on_chunk: &(dyn Fn(u64) + Send + Sync),
) -> Result<u64> {
    let start = Instant::now();
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.with_path(parent)?;
    }

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(InstallError::Network {
            url: url.to_string(),
            status: Some(response.status().as_u16()),
            message: format!("HTTP error {}", response.status()),
        });
    }

    let tmp_name = format!(
        "{}.part",
        dest.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    let tmp_path = dest.with_file_name(tmp_name);
    let mut file = tokio::fs::File::create(&tmp_path).await.with_path(&tmp_path)?;
    let mut written: u64 = 0;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.with_path(&tmp_path)?;
        written += chunk.len() as u64;
        on_chunk(chunk.len() as u64);
    }
    file.flush().await.with_path(&tmp_path)?;
    drop(file);

    if let Some((expected, algorithm)) = checksum {
        verify_or_remove(&tmp_path, expected, algorithm).await?;
    }

    tokio::fs::rename(&tmp_path, dest).await.with_path(dest)?;

    log::debug!(
        "Downloaded {} -> {:?} ({} bytes in {:.2}s)",
        url,
        dest,
        written,
        start.elapsed().as_secs_f64()
    );
    Ok(written)
}

/// Download every task with at most `concurrency` transfers in flight.
///
/// A cumulative `progress` event follows every chunk. The first failure
/// aborts the tasks that have not finished yet.
pub async fn download_batch(
    client: &Client,
    tasks: Vec<DownloadTask>,
    total_size: u64,
    concurrency: usize,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    let count = tasks.len();
    let downloaded = AtomicU64::new(0);
    log::info!("Downloading {} files ({} bytes)", count, total_size);

    stream::iter(tasks)
        .map(|task| {
            let downloaded = &downloaded;
            async move {
                let label = task.label.clone();
                let on_chunk = |len: u64| {
                    let now = downloaded.fetch_add(len, Ordering::SeqCst) + len;
                    reporter.report(InstallEvent::Progress {
                        downloaded: now,
                        total: total_size,
                        label: label.clone(),
                    });
                };
                let checksum = task.sha1.as_deref().map(|s| (s, HashAlgorithm::Sha1));
                download_file(client, &task.url, &task.destination(), checksum, &on_chunk)
                    .await
                    .map_err(|e| {
                        log::error!("Failed to download {}: {}", task.label, e);
                        e
                    })
            }
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<_>>()
        .await?;

    log::info!(
        "Batch download complete: {} files, {} bytes",
        count,
        downloaded.load(Ordering::SeqCst)
    );
    Ok(())
}

/// Body of a maven `.sha1` sidecar, when the repository publishes one.
pub async fn fetch_checksum(client: &Client, url: &str) -> Option<String> {
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        log::debug!("No checksum published at {}", url);
        return None;
    }
    let body = response.text().await.ok()?;
    // Sidecars may carry "<hash>  <file name>".
    body.split_whitespace()
        .next()
        .map(|hash| hash.to_lowercase())
        .filter(|hash| hash.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::types::ChannelReporter;
    use sha1::{Digest, Sha1};
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha1_hex(data: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    #[tokio::test]
    async fn probe_reads_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/a.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 42]))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/empty.jar"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        assert_eq!(probe(&client, &format!("{}/a.jar", server.uri())).await, Some(42));
        assert_eq!(probe(&client, &format!("{}/empty.jar", server.uri())).await, None);
        assert_eq!(probe(&client, &format!("{}/missing.jar", server.uri())).await, None);
    }

    #[tokio::test]
    async fn resolve_falls_back_to_first_live_mirror() {
        let dead = MockServer::start().await;
        let live = MockServer::start().await;
        let later = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/org/ow2/asm/asm/9.5/asm-9.5.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 128]))
            .mount(&live)
            .await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 64]))
            .expect(0)
            .mount(&later)
            .await;

        let mirrors = vec![dead.uri(), live.uri(), later.uri()];
        let remote = resolve(
            &Client::new(),
            None,
            "org/ow2/asm/asm/9.5/asm-9.5.jar",
            &mirrors,
        )
        .await
        .unwrap();
        assert_eq!(remote.url, format!("{}/org/ow2/asm/asm/9.5/asm-9.5.jar", live.uri()));
        assert_eq!(remote.size, 128);
    }

    #[tokio::test]
    async fn download_file_verifies_before_rename() {
        let server = MockServer::start().await;
        let body = b"library bytes".to_vec();
        Mock::given(method("GET"))
            .and(path("/lib.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("nested/lib.jar");
        let url = format!("{}/lib.jar", server.uri());
        let client = Client::new();

        let err = download_file(&client, &url, &dest, Some(("deadbeef", HashAlgorithm::Sha1)), &|_: u64| {})
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "IntegrityError");
        assert!(!dest.exists());
        assert!(!dir.path().join("nested/lib.jar.part").exists());

        let expected = sha1_hex(&body);
        let written = download_file(&client, &url, &dest, Some((&expected, HashAlgorithm::Sha1)), &|_: u64| {})
            .await
            .unwrap();
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn batch_reports_monotonic_progress() {
        let server = MockServer::start().await;
        for name in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/{}.jar", name)))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 100]))
                .mount(&server)
                .await;
        }

        let dir = tempdir().unwrap();
        let tasks: Vec<DownloadTask> = ["a", "b", "c"]
            .iter()
            .map(|name| DownloadTask {
                url: format!("{}/{}.jar", server.uri(), name),
                folder: dir.path().to_path_buf(),
                file_name: format!("{}.jar", name),
                size: 100,
                sha1: Some(sha1_hex(&[9u8; 100])),
                label: format!("libraries/{}.jar", name),
            })
            .collect();

        let (reporter, mut rx) = ChannelReporter::new();
        download_batch(&Client::new(), tasks, 300, 2, &reporter).await.unwrap();
        drop(reporter);

        let mut last = 0;
        while let Some(event) = rx.recv().await {
            match event {
                InstallEvent::Progress { downloaded, total, .. } => {
                    assert!(downloaded >= last);
                    assert_eq!(total, 300);
                    last = downloaded;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(last, 300);
        for name in ["a", "b", "c"] {
            assert!(dir.path().join(format!("{}.jar", name)).exists());
        }
    }

    #[tokio::test]
    async fn batch_aborts_on_first_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let task = DownloadTask {
            url: format!("{}/missing.jar", server.uri()),
            folder: dir.path().to_path_buf(),
            file_name: "missing.jar".to_string(),
            size: 10,
            sha1: None,
            label: "libraries/missing.jar".to_string(),
        };
        let err = download_batch(&Client::new(), vec![task], 10, 4, &crate::installer::types::SilentReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Network { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn checksum_sidecar_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jar.sha1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ABCDEF0123  a.jar\n"))
            .mount(&server)
            .await;

        let client = Client::new();
        assert_eq!(
            fetch_checksum(&client, &format!("{}/a.jar.sha1", server.uri())).await,
            Some("abcdef0123".to_string())
        );
        assert_eq!(fetch_checksum(&client, &format!("{}/b.jar.sha1", server.uri())).await, None);
    }
}
