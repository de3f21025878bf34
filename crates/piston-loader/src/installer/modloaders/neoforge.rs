//! NeoForge reuses the Forge installer pipeline; only build lookup and the
//! installer location differ.

use super::forge::installer::fetch_installer;
use super::forge::{ForgeFlavor, ForgeStrategy, ResolvedInstaller};
use crate::error::Result;
use crate::installer::config::fill_template;
use crate::installer::core::downloader;
use crate::installer::core::integrity::HashAlgorithm;
use crate::installer::metadata::{fetch_neoforge_metadata, resolve_build};
use crate::installer::patcher::ProcessRunner;
use crate::installer::types::{InstallContext, ProgressReporter};
use std::sync::Arc;

pub fn strategy(runner: Arc<dyn ProcessRunner>) -> ForgeStrategy {
    ForgeStrategy::new(ForgeFlavor::NeoForge, runner)
}

/// Resolve the NeoForge build and make sure its installer jar is on disk.
pub async fn resolve_neoforge_installer(
    ctx: &InstallContext,
    reporter: &dyn ProgressReporter,
) -> Result<ResolvedInstaller> {
    let (metadata, legacy_api) = fetch_neoforge_metadata(ctx).await?;
    let build = resolve_build(&metadata, &ctx.build)?;
    log::info!(
        "Resolved NeoForge build {} for Minecraft {}{}",
        build,
        ctx.game_version,
        if legacy_api { " (legacy artifact)" } else { "" }
    );

    let endpoints = &ctx.endpoints.neoforge;
    let template = if legacy_api {
        &endpoints.legacy_installer
    } else {
        &endpoints.installer
    };
    let url = fill_template(template, &[("version", build.as_str())]);
    let file_name = url.rsplit('/').next().unwrap_or("installer.jar").to_string();
    let path = ctx.loader_dir().join(file_name);

    let sha1 = downloader::fetch_checksum(&ctx.client, &format!("{}.sha1", url)).await;
    if sha1.is_none() {
        log::warn!("No checksum published for {}, skipping verification", url);
    }

    let checksum = sha1.as_deref().map(|h| (h, HashAlgorithm::Sha1));
    fetch_installer(ctx, &url, &path, checksum, reporter).await?;

    Ok(ResolvedInstaller {
        flavor: ForgeFlavor::NeoForge,
        path,
        build,
        jar: true,
        legacy_api,
    })
}
