use crate::error::{InstallError, Result};
use crate::installer::config::{Endpoints, DEFAULT_CONCURRENCY, REQUEST_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::mpsc;

/// Lifecycle notifications emitted while a loader is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InstallEvent {
    /// A library has been inspected during resolution (1-based index).
    Check {
        index: usize,
        total: usize,
        label: String,
    },
    /// Cumulative bytes written by the download batch.
    Progress {
        downloaded: u64,
        total: u64,
        label: String,
    },
    Extract { label: String },
    Patch { label: String },
}

/// Receives install events. Implementations must be cheap; they are called
/// from download tasks.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: InstallEvent);
}

/// A progress reporter that does nothing (silent).
/// Useful for background verification or tests.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: InstallEvent) {}
}

/// Forwards every event into an unbounded tokio channel.
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<InstallEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InstallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: InstallEvent) {
        // Receiver dropped means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

/// The closed set of supported loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderType {
    Forge,
    NeoForge,
    Fabric,
    LegacyFabric,
    Quilt,
}

impl LoaderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderType::Forge => "forge",
            LoaderType::NeoForge => "neoforge",
            LoaderType::Fabric => "fabric",
            LoaderType::LegacyFabric => "legacyfabric",
            LoaderType::Quilt => "quilt",
        }
    }
}

impl FromStr for LoaderType {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "forge" => Ok(LoaderType::Forge),
            "neoforge" => Ok(LoaderType::NeoForge),
            "fabric" => Ok(LoaderType::Fabric),
            "legacyfabric" => Ok(LoaderType::LegacyFabric),
            "quilt" => Ok(LoaderType::Quilt),
            _ => Err(InstallError::UnsupportedLoader(s.to_string())),
        }
    }
}

impl fmt::Display for LoaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which build of a loader to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSelector {
    Latest,
    Recommended,
    Explicit(String),
}

impl BuildSelector {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "latest" => BuildSelector::Latest,
            "recommended" => BuildSelector::Recommended,
            other => BuildSelector::Explicit(other.to_string()),
        }
    }
}

/// Paths of the vanilla game the loader is installed on top of.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Java executable used by processors; `which java` when unset.
    #[serde(default)]
    pub java_path: Option<PathBuf>,
    pub minecraft_jar: PathBuf,
    pub minecraft_json: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderOptions {
    #[serde(rename = "type")]
    pub loader_type: String,
    /// Minecraft version, e.g. "1.20.1".
    pub version: String,
    /// `latest`, `recommended` or an explicit build id.
    #[serde(default = "default_build")]
    pub build: String,
    #[serde(default)]
    pub config: GameConfig,
}

fn default_build() -> String {
    "latest".to_string()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// Caller-facing installation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOptions {
    /// Root of the game store (`libraries/`, `versions/` live under it).
    pub root: PathBuf,
    pub loader: LoaderOptions,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl InstallOptions {
    pub fn new(root: impl Into<PathBuf>, loader_type: LoaderType, version: &str) -> Self {
        Self {
            root: root.into(),
            loader: LoaderOptions {
                loader_type: loader_type.as_str().to_string(),
                version: version.to_string(),
                build: default_build(),
                config: GameConfig::default(),
            },
            concurrency: DEFAULT_CONCURRENCY,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_build(mut self, build: &str) -> Self {
        self.loader.build = build.to_string();
        self
    }

    pub fn with_game(mut self, minecraft_jar: impl Into<PathBuf>, minecraft_json: impl Into<PathBuf>) -> Self {
        self.loader.config.minecraft_jar = minecraft_jar.into();
        self.loader.config.minecraft_json = minecraft_json.into();
        self
    }
}

/// Immutable view of one installation, derived once from [`InstallOptions`].
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub root: PathBuf,
    pub loader: LoaderType,
    pub game_version: String,
    pub build: BuildSelector,
    pub java_path: Option<PathBuf>,
    pub minecraft_jar: PathBuf,
    pub minecraft_json: PathBuf,
    pub concurrency: usize,
    pub endpoints: Endpoints,
    pub os: OsType,
    pub arch: Arch,
    pub client: reqwest::Client,
}

impl InstallContext {
    pub fn from_options(options: &InstallOptions) -> Result<Self> {
        let loader = options.loader.loader_type.parse::<LoaderType>()?;
        if options.concurrency == 0 {
            return Err(InstallError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("piston-loader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            root: options.root.clone(),
            loader,
            game_version: options.loader.version.clone(),
            build: BuildSelector::parse(&options.loader.build),
            java_path: options.loader.config.java_path.clone(),
            minecraft_jar: options.loader.config.minecraft_jar.clone(),
            minecraft_json: options.loader.config.minecraft_json.clone(),
            concurrency: options.concurrency,
            endpoints: options.endpoints.clone(),
            os: OsType::current(),
            arch: Arch::current(),
            client,
        })
    }

    /// Get the path to the libraries directory
    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    /// Get the path to the versions directory
    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    /// Directory holding downloaded installer artifacts for this loader.
    pub fn loader_dir(&self) -> PathBuf {
        self.root.join(self.loader.as_str())
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    /// `versions/<id>/<id>.json`
    pub fn version_json_path(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.json", id))
    }

    pub fn library_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.libraries_dir().join(relative)
    }
}

/// Operating system types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Windows,
    MacOS,
    Linux,
}

impl OsType {
    /// Detect the current OS
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        return OsType::Windows;

        #[cfg(target_os = "macos")]
        return OsType::MacOS;

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        return OsType::Linux;
    }

    /// Get the OS name as a string (for rule matching)
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Windows => "windows",
            OsType::Linux => "linux",
            OsType::MacOS => "osx",
        }
    }
}

/// Architecture types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    X86,
    Arm64,
    Arm32,
}

impl Arch {
    /// Detect the current architecture
    pub fn current() -> Self {
        #[cfg(target_arch = "x86")]
        return Arch::X86;

        #[cfg(target_arch = "aarch64")]
        return Arch::Arm64;

        #[cfg(target_arch = "arm")]
        return Arch::Arm32;

        #[cfg(not(any(target_arch = "x86", target_arch = "aarch64", target_arch = "arm")))]
        return Arch::X64;
    }

    /// Value substituted for `${arch}` in native classifiers.
    pub fn bits(&self) -> &'static str {
        match self {
            Arch::X86 | Arch::Arm32 => "32",
            Arch::X64 | Arch::Arm64 => "64",
        }
    }

    /// Name used by `os.arch` in library rules.
    pub fn rule_name(&self) -> &'static str {
        match self {
            Arch::X64 => "x86_64",
            Arch::X86 => "x86",
            Arch::Arm64 => "arm64",
            Arch::Arm32 => "arm32",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_type_is_case_insensitive() {
        assert_eq!("NeoForge".parse::<LoaderType>().unwrap(), LoaderType::NeoForge);
        assert_eq!("LEGACYFABRIC".parse::<LoaderType>().unwrap(), LoaderType::LegacyFabric);
        let err = "rift".parse::<LoaderType>().unwrap_err();
        assert_eq!(err.error_type(), "UnsupportedLoaderError");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: InstallOptions = serde_json::from_str(
            r#"{
                "root": "/tmp/store",
                "loader": {
                    "type": "fabric",
                    "version": "1.20.1",
                    "config": {"minecraftJar": "/tmp/a.jar", "minecraftJson": "/tmp/a.json"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(options.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(options.loader.build, "latest");
        assert!(options.loader.config.java_path.is_none());
    }

    #[test]
    fn context_derives_store_paths() {
        let options = InstallOptions::new("/store", LoaderType::Forge, "1.20.1");
        let ctx = InstallContext::from_options(&options).unwrap();
        assert_eq!(ctx.loader_dir(), PathBuf::from("/store/forge"));
        assert_eq!(
            ctx.version_json_path("forge-1.20.1-47.2.0"),
            PathBuf::from("/store/versions/forge-1.20.1-47.2.0/forge-1.20.1-47.2.0.json")
        );
        assert_eq!(ctx.build, BuildSelector::Latest);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut options = InstallOptions::new("/store", LoaderType::Quilt, "1.20.1");
        options.concurrency = 0;
        assert!(matches!(
            InstallContext::from_options(&options),
            Err(InstallError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn channel_reporter_forwards_events() {
        let (reporter, mut rx) = ChannelReporter::new();
        reporter.report(InstallEvent::Extract {
            label: "forge-universal.jar".to_string(),
        });
        assert_eq!(
            rx.recv().await,
            Some(InstallEvent::Extract {
                label: "forge-universal.jar".to_string()
            })
        );
    }
}
