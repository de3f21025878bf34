use crate::error::Result;
use crate::installer::profile::VersionProfile;
use crate::installer::types::{InstallContext, ProgressReporter};
use futures::future::BoxFuture;

/// The per-loader half of an installation.
///
/// The orchestrator drives every strategy through the same sequence:
/// `resolve_installer`, `extract_profile`, persisting [`version_profile`],
/// `download_libraries`, then `patch`.
///
/// [`version_profile`]: LoaderStrategy::version_profile
pub trait LoaderStrategy: Send + Sync {
    /// What `resolve_installer` hands to the later stages.
    type Installer: Send + Sync;
    /// What `extract_profile` hands to the later stages.
    type Profile: Send + Sync;

    fn resolve_installer<'a>(
        &'a self,
        ctx: &'a InstallContext,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<Self::Installer>>;

    fn extract_profile<'a>(
        &'a self,
        ctx: &'a InstallContext,
        installer: &'a Self::Installer,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<Self::Profile>>;

    /// The document persisted under `versions/<id>/<id>.json`.
    fn version_profile<'p>(&self, profile: &'p Self::Profile) -> &'p VersionProfile;

    fn download_libraries<'a>(
        &'a self,
        ctx: &'a InstallContext,
        profile: &'a Self::Profile,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<()>>;

    fn patch<'a>(
        &'a self,
        ctx: &'a InstallContext,
        installer: &'a Self::Installer,
        profile: &'a Self::Profile,
        reporter: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, Result<()>>;
}
