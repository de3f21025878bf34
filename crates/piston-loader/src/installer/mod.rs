pub mod config;
pub mod core;
pub mod metadata;
pub mod modloaders;
pub mod patcher;
pub mod profile;
pub mod types;


use crate::error::{InstallError, Stage, StageError};
use crate::installer::core::traits::LoaderStrategy;
use crate::installer::modloaders::{fabric, forge, legacy_fabric, neoforge, quilt};
use crate::installer::patcher::{JavaProcessRunner, ProcessRunner};
use crate::installer::profile::{write_version_profile, VersionProfile};
use std::sync::Arc;
use std::time::Instant;
use types::{InstallContext, InstallOptions, LoaderType, ProgressReporter};

/// Runs installations, sharing one processor runner between them.
#[derive(Clone)]
pub struct LoaderInstaller {
    runner: Arc<dyn ProcessRunner>,
}

impl Default for LoaderInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderInstaller {
    pub fn new() -> Self {
        Self {
            runner: Arc::new(JavaProcessRunner),
        }
    }

    /// Use `runner` instead of spawning java for processor steps.
    pub fn with_runner(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Install the loader described by `options` and return the persisted
    /// version profile.
    pub async fn install(
        &self,
        options: &InstallOptions,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<VersionProfile, StageError> {
        let ctx = InstallContext::from_options(options).map_err(at(Stage::Dispatch))?;

        log::info!(
            "Starting installation: loader={}, version={}, build={:?}",
            ctx.loader,
            ctx.game_version,
            ctx.build
        );

        let reporter = reporter.as_ref();
        match ctx.loader {
            LoaderType::Forge => {
                let strategy = forge::strategy(self.runner.clone());
                run_pipeline(&strategy, &ctx, reporter).await
            }
            LoaderType::NeoForge => {
                let strategy = neoforge::strategy(self.runner.clone());
                run_pipeline(&strategy, &ctx, reporter).await
            }
            LoaderType::Fabric => run_pipeline(&fabric::strategy(), &ctx, reporter).await,
            LoaderType::LegacyFabric => {
                run_pipeline(&legacy_fabric::strategy(), &ctx, reporter).await
            }
            LoaderType::Quilt => run_pipeline(&quilt::strategy(), &ctx, reporter).await,
        }
    }
}

/// Main entry point for loader installation.
/// Dispatches to the strategy matching `options.loader.loader_type`.
pub async fn install(
    options: &InstallOptions,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<VersionProfile, StageError> {
    LoaderInstaller::new().install(options, reporter).await
}

fn at(stage: Stage) -> impl FnOnce(InstallError) -> StageError {
    move |source| {
        log::error!("Installation failed during {}: {}", stage.as_str(), source);
        StageError::new(stage, source)
    }
}

/// Drive `strategy` through every stage, stopping at the first failure.
pub async fn run_pipeline<S: LoaderStrategy>(
    strategy: &S,
    ctx: &InstallContext,
    reporter: &dyn ProgressReporter,
) -> Result<VersionProfile, StageError> {
    let start = Instant::now();

    log::info!("[{}] Resolving installer", ctx.loader);
    let installer = strategy
        .resolve_installer(ctx, reporter)
        .await
        .map_err(at(Stage::ResolveInstaller))?;

    log::info!("[{}] Extracting profile", ctx.loader);
    let profile = strategy
        .extract_profile(ctx, &installer, reporter)
        .await
        .map_err(at(Stage::ExtractProfile))?;

    let version = strategy.version_profile(&profile).clone();
    let json_path = ctx.version_json_path(&version.id);
    write_version_profile(&json_path, &version)
        .await
        .map_err(at(Stage::WriteProfile))?;

    log::info!("[{}] Downloading libraries", ctx.loader);
    strategy
        .download_libraries(ctx, &profile, reporter)
        .await
        .map_err(at(Stage::DownloadLibraries))?;

    log::info!("[{}] Applying patches", ctx.loader);
    strategy
        .patch(ctx, &installer, &profile, reporter)
        .await
        .map_err(at(Stage::Patch))?;

    log::info!(
        "Installed {} in {:.2}s",
        version.id,
        start.elapsed().as_secs_f64()
    );
    Ok(version)
}
