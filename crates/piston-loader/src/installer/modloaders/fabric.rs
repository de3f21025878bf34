//! Loaders distributed as a ready-made version profile (Fabric and its
//! forks). There is no installer archive and nothing to patch; the profile
//! JSON is fetched from the meta service and its libraries downloaded.

use crate::error::Result;
use crate::installer::config::{
    fill_template, Endpoints, ProfileLoaderEndpoints, FETCH_JSON_MAX_RETRIES,
};
use crate::installer::core::downloader::download_batch;
use crate::installer::core::http::{fetch_json, FetchOptions};
use crate::installer::core::library::{collect_downloads, dedupe};
use crate::installer::core::traits::LoaderStrategy;
use crate::installer::metadata::{fetch_profile_loader_metadata, resolve_build, StableMarker};
use crate::installer::profile::VersionProfile;
use crate::installer::types::{InstallContext, ProgressReporter};
use futures::future::BoxFuture;

/// Meta services speaking the Fabric profile protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileLoaderKind {
    Fabric,
    LegacyFabric,
    Quilt,
}

impl ProfileLoaderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProfileLoaderKind::Fabric => "Fabric",
            ProfileLoaderKind::LegacyFabric => "LegacyFabric",
            ProfileLoaderKind::Quilt => "Quilt",
        }
    }

    pub fn stable_marker(&self) -> StableMarker {
        match self {
            ProfileLoaderKind::Quilt => StableMarker::NotBeta,
            _ => StableMarker::Flag,
        }
    }

    pub fn endpoints<'e>(&self, endpoints: &'e Endpoints) -> &'e ProfileLoaderEndpoints {
        match self {
            ProfileLoaderKind::Fabric => &endpoints.fabric,
            ProfileLoaderKind::LegacyFabric => &endpoints.legacy_fabric,
            ProfileLoaderKind::Quilt => &endpoints.quilt,
        }
    }
}

/// Profile JSON fetched for one loader build.
#[derive(Debug, Clone)]
pub struct LoaderProfile {
    pub build: String,
    pub profile: VersionProfile,
}

pub struct ProfileLoaderStrategy {
    kind: ProfileLoaderKind,
}

pub fn strategy() -> ProfileLoaderStrategy {
    ProfileLoaderStrategy::new(ProfileLoaderKind::Fabric)
}

impl ProfileLoaderStrategy {
    pub fn new(kind: ProfileLoaderKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ProfileLoaderKind {
        self.kind
    }

    async fn fetch_profile(&self, ctx: &InstallContext) -> Result<LoaderProfile> {
        let endpoints = self.kind.endpoints(&ctx.endpoints);
        let metadata = fetch_profile_loader_metadata(
            ctx,
            self.kind.name(),
            endpoints,
            self.kind.stable_marker(),
        )
        .await?;
        let build = resolve_build(&metadata, &ctx.build)?;
        log::info!(
            "Using {} loader {} for Minecraft {}",
            self.kind.name(),
            build,
            ctx.game_version
        );

        let url = fill_template(
            &endpoints.profile,
            &[("version", ctx.game_version.as_str()), ("build", build.as_str())],
        );
        let profile: VersionProfile =
            fetch_json(&ctx.client, &url, &FetchOptions::default(), FETCH_JSON_MAX_RETRIES).await?;
        log::debug!(
            "Fetched {} profile {} ({} libraries)",
            self.kind.name(),
            profile.id,
            profile.libraries.len()
        );

        Ok(LoaderProfile { build, profile })
    }

    async fn download(
        &self,
        ctx: &InstallContext,
        profile: &VersionProfile,
        reporter: &dyn ProgressReporter,
    ) -> Result<()> {
        let libraries = dedupe(profile.libraries.clone());
        let (tasks, total_size) = collect_downloads(ctx, &libraries, &[], reporter).await?;
        download_batch(&ctx.client, tasks, total_size, ctx.concurrency, reporter).await
    }
}

impl LoaderStrategy for ProfileLoaderStrategy {
    type Installer = LoaderProfile;
    type Profile = VersionProfile;

    fn resolve_installer<'a>(
        &'a self,
        ctx: &'a InstallContext,
        _reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<LoaderProfile>> {
        Box::pin(self.fetch_profile(ctx))
    }

    fn extract_profile<'a>(
        &'a self,
        _ctx: &'a InstallContext,
        installer: &'a LoaderProfile,
        _reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<VersionProfile>> {
        Box::pin(async move { Ok(installer.profile.clone()) })
    }

    fn version_profile<'p>(&self, profile: &'p VersionProfile) -> &'p VersionProfile {
        profile
    }

    fn download_libraries<'a>(
        &'a self,
        ctx: &'a InstallContext,
        profile: &'a VersionProfile,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.download(ctx, profile, reporter))
    }

    fn patch<'a>(
        &'a self,
        _ctx: &'a InstallContext,
        _installer: &'a LoaderProfile,
        _profile: &'a VersionProfile,
        _reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
