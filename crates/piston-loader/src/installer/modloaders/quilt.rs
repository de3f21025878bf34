use super::fabric::{ProfileLoaderKind, ProfileLoaderStrategy};

/// Quilt uses the same installation process as Fabric, with its own meta
/// service and `-beta` builds counted as unstable.
pub fn strategy() -> ProfileLoaderStrategy {
    ProfileLoaderStrategy::new(ProfileLoaderKind::Quilt)
}
