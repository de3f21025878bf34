use super::fabric::{ProfileLoaderKind, ProfileLoaderStrategy};

/// LegacyFabric serves the Fabric profile protocol for pre-1.14 versions.
pub fn strategy() -> ProfileLoaderStrategy {
    ProfileLoaderStrategy::new(ProfileLoaderKind::LegacyFabric)
}
