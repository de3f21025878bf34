pub mod installer;
pub mod legacy;
pub mod parser;

use self::installer::resolve_forge_installer;
use self::parser::{extract_data_files, extract_universal, read_install_profile};
use crate::error::Result;
use crate::installer::core::archive::ZipArchiveReader;
use crate::installer::core::downloader::download_batch;
use crate::installer::core::library::{collect_downloads, dedupe};
use crate::installer::core::traits::LoaderStrategy;
use crate::installer::modloaders::neoforge;
use crate::installer::patcher::{PatchConfig, Patcher, ProcessRunner};
use crate::installer::profile::{InstallManifest, VersionProfile};
use crate::installer::types::{InstallContext, ProgressReporter};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub fn strategy(runner: Arc<dyn ProcessRunner>) -> ForgeStrategy {
    ForgeStrategy::new(ForgeFlavor::Forge, runner)
}

/// Which installer family a [`ForgeStrategy`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeFlavor {
    Forge,
    NeoForge,
}

impl ForgeFlavor {
    pub fn name(&self) -> &'static str {
        match self {
            ForgeFlavor::Forge => "Forge",
            ForgeFlavor::NeoForge => "NeoForge",
        }
    }

    /// Libraries that the installer itself provides once extracted.
    pub fn own_artifacts(&self) -> &'static [&'static str] {
        match self {
            ForgeFlavor::Forge => &["net.minecraftforge:forge:", "net.minecraftforge:minecraftforge:"],
            ForgeFlavor::NeoForge => &["net.neoforged:forge:", "net.neoforged:neoforge:"],
        }
    }
}

/// Installer artifact on disk plus what is known about its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstaller {
    pub flavor: ForgeFlavor,
    pub path: PathBuf,
    pub build: String,
    /// False for archives predating the installer jar.
    pub jar: bool,
    /// NeoForge builds published under the old `net.neoforged:forge` artifact.
    pub legacy_api: bool,
}

impl ResolvedInstaller {
    /// Version id used for merged-jar profiles.
    pub fn legacy_id(&self) -> String {
        format!("forge-{}", self.build)
    }

    /// Coordinate prefix of the loader's universal jar.
    pub fn universal_prefix(&self) -> &'static str {
        match (self.flavor, self.legacy_api) {
            (ForgeFlavor::Forge, _) => "net.minecraftforge:forge",
            (ForgeFlavor::NeoForge, true) => "net.neoforged:forge",
            (ForgeFlavor::NeoForge, false) => "net.neoforged:neoforge",
        }
    }
}

/// Installer-driven profile with everything the patch stage needs.
#[derive(Debug, Clone)]
pub struct ModernProfile {
    pub install: InstallManifest,
    pub version: VersionProfile,
    /// Own artifacts were extracted, so their URL-less descriptors are skipped.
    pub provided: bool,
    pub binpatch: Option<PathBuf>,
    pub extracted: HashMap<String, PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ForgeProfile {
    Modern(ModernProfile),
    /// Merged client jar; nothing left to download or patch.
    Legacy(VersionProfile),
}

/// Shared strategy for Forge and NeoForge installers.
pub struct ForgeStrategy {
    flavor: ForgeFlavor,
    patcher: Patcher,
}

impl ForgeStrategy {
    pub fn new(flavor: ForgeFlavor, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            flavor,
            patcher: Patcher::new(runner),
        }
    }

    pub fn flavor(&self) -> ForgeFlavor {
        self.flavor
    }

    async fn extract(
        &self,
        ctx: &InstallContext,
        installer: &ResolvedInstaller,
        reporter: &dyn ProgressReporter,
    ) -> Result<ForgeProfile> {
        if !installer.jar {
            let profile = legacy::build_legacy_profile(ctx, installer, reporter).await?;
            return Ok(ForgeProfile::Legacy(profile));
        }

        let reader = ZipArchiveReader::new(&installer.path);
        let profile = read_install_profile(&reader).await?;
        let mut version = profile.version;
        let install = profile.install;

        let universal =
            extract_universal(ctx, &reader, &install, installer.universal_prefix(), reporter).await?;
        let extracted = extract_data_files(
            ctx,
            &reader,
            &install,
            &version.id,
            universal.binpatch.as_deref(),
            reporter,
        )
        .await?;

        if !install.processors.is_empty() {
            version.processors = install.processors.clone();
        }

        Ok(ForgeProfile::Modern(ModernProfile {
            install,
            version,
            provided: universal.provided,
            binpatch: universal.binpatch,
            extracted,
        }))
    }

    async fn download(
        &self,
        ctx: &InstallContext,
        profile: &ForgeProfile,
        reporter: &dyn ProgressReporter,
    ) -> Result<()> {
        let ForgeProfile::Modern(profile) = profile else {
            return Ok(());
        };

        let libraries = dedupe(
            profile
                .version
                .libraries
                .iter()
                .chain(profile.install.libraries.iter())
                .cloned()
                .collect(),
        );
        let provided: &[&str] = if profile.provided {
            self.flavor.own_artifacts()
        } else {
            &[]
        };

        let (tasks, total_size) = collect_downloads(ctx, &libraries, provided, reporter).await?;
        download_batch(&ctx.client, tasks, total_size, ctx.concurrency, reporter).await
    }

    async fn apply_patches(
        &self,
        ctx: &InstallContext,
        installer: &ResolvedInstaller,
        profile: &ForgeProfile,
        reporter: &dyn ProgressReporter,
    ) -> Result<()> {
        let ForgeProfile::Modern(profile) = profile else {
            return Ok(());
        };
        if profile.install.processors.is_empty() {
            return Ok(());
        }

        let config = PatchConfig {
            root: ctx.root.clone(),
            libraries_dir: ctx.libraries_dir(),
            java: ctx.java_path.clone(),
            minecraft_jar: ctx.minecraft_jar.clone(),
            minecraft_version: ctx.game_version.clone(),
            installer: installer.path.clone(),
            binpatch: profile.binpatch.clone(),
            extracted: profile.extracted.clone(),
        };

        if self.patcher.check(&profile.install, &config).await? {
            log::info!("{} {} is already patched", self.flavor.name(), installer.build);
            return Ok(());
        }
        self.patcher.run(&profile.install, &config, reporter).await
    }
}

impl LoaderStrategy for ForgeStrategy {
    type Installer = ResolvedInstaller;
    type Profile = ForgeProfile;

    fn resolve_installer<'a>(
        &'a self,
        ctx: &'a InstallContext,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<ResolvedInstaller>> {
        match self.flavor {
            ForgeFlavor::Forge => resolve_forge_installer(ctx, reporter).boxed(),
            ForgeFlavor::NeoForge => neoforge::resolve_neoforge_installer(ctx, reporter).boxed(),
        }
    }

    fn extract_profile<'a>(
        &'a self,
        ctx: &'a InstallContext,
        installer: &'a ResolvedInstaller,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<ForgeProfile>> {
        Box::pin(self.extract(ctx, installer, reporter))
    }

    fn version_profile<'p>(&self, profile: &'p ForgeProfile) -> &'p VersionProfile {
        match profile {
            ForgeProfile::Modern(modern) => &modern.version,
            ForgeProfile::Legacy(version) => version,
        }
    }

    fn download_libraries<'a>(
        &'a self,
        ctx: &'a InstallContext,
        profile: &'a ForgeProfile,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.download(ctx, profile, reporter))
    }

    fn patch<'a>(
        &'a self,
        ctx: &'a InstallContext,
        installer: &'a ResolvedInstaller,
        profile: &'a ForgeProfile,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.apply_patches(ctx, installer, profile, reporter))
    }
}
