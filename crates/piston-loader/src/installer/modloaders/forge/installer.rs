//! Forge installer artifact download.

use super::{ForgeFlavor, ResolvedInstaller};
use crate::error::{IoResultExt, Result};
use crate::installer::core::downloader::{self, download_file};
use crate::installer::core::integrity::{verify, HashAlgorithm};
use crate::installer::metadata::{
    fetch_forge_build_meta, fetch_forge_metadata, resolve_build, select_forge_artifact,
};
use crate::installer::types::{InstallContext, InstallEvent, ProgressReporter};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Resolve the Forge build and make sure its installer artifact is on disk.
pub async fn resolve_forge_installer(
    ctx: &InstallContext,
    reporter: &dyn ProgressReporter,
) -> Result<ResolvedInstaller> {
    let metadata = fetch_forge_metadata(ctx).await?;
    let build = resolve_build(&metadata, &ctx.build)?;
    log::info!("Resolved Forge build {} for Minecraft {}", build, ctx.game_version);

    let meta = fetch_forge_build_meta(ctx, &build).await?;
    let artifact = select_forge_artifact(ctx, &build, &meta)?;
    let path = ctx.loader_dir().join(artifact.file_name());
    let md5 = Some(artifact.md5.as_str()).filter(|s| !s.is_empty());

    let checksum = md5.map(|h| (h, HashAlgorithm::Md5));
    fetch_installer(ctx, &artifact.url, &path, checksum, reporter).await?;

    Ok(ResolvedInstaller {
        flavor: ForgeFlavor::Forge,
        path,
        build,
        jar: artifact.extension == "jar",
        legacy_api: false,
    })
}

/// Reuse `dest` when it passes verification, otherwise download it again.
pub(crate) async fn fetch_installer(
    ctx: &InstallContext,
    url: &str,
    dest: &Path,
    checksum: Option<(&str, HashAlgorithm)>,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    if dest.exists() {
        let valid = match checksum {
            Some((expected, algorithm)) => verify(dest, expected, algorithm).await?,
            None => true,
        };
        if valid {
            log::info!("Reusing installer {:?}", dest);
            return Ok(());
        }
        log::warn!("Cached installer {:?} failed verification, downloading again", dest);
        tokio::fs::remove_file(dest).await.with_path(dest)?;
    }

    let total = downloader::probe(&ctx.client, url).await.unwrap_or(0);
    let label = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());
    let downloaded = AtomicU64::new(0);
    let on_chunk = |len: u64| {
        let now = downloaded.fetch_add(len, Ordering::SeqCst) + len;
        reporter.report(InstallEvent::Progress {
            downloaded: now,
            total,
            label: label.clone(),
        });
    };

    log::info!("Downloading installer {}", url);
    download_file(&ctx.client, url, dest, checksum, &on_chunk).await?;
    Ok(())
}
