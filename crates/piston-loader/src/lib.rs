//! Mod-loader installation pipeline.
//!
//! Resolves a loader build for a Minecraft version, fetches and unpacks the
//! installer, downloads every library the loader needs (with mirror fallback
//! and hash checks) and runs the post-install processors. The entry point is
//! [`installer::install`].

pub mod error;
pub mod installer;
pub mod utils;

pub use error::{InstallError, Result, Stage, StageError, TaggedError};
pub use installer::profile::VersionProfile;
pub use installer::types::{InstallEvent, InstallOptions, LoaderType, ProgressReporter};
pub use installer::{install, LoaderInstaller};
