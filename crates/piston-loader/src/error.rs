use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstallError>;

/// Everything that can stop an installation.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Loader {0} not found")]
    UnsupportedLoader(String),

    #[error("{loader} doesn't support Minecraft {version}")]
    UnsupportedVersion { loader: String, version: String },

    #[error("Build {build} not found, Available builds: {}", available.join(", "))]
    BuildNotFound {
        build: String,
        available: Vec<String>,
    },

    #[error("Invalid installer: {0}")]
    InvalidInstaller(String),

    #[error("{algorithm} mismatch for {path:?}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        algorithm: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Impossible to download {name}: no source is reachable")]
    LibraryUnavailable { name: String, file: String },

    #[error("Rate limited by {url}, gave up after {attempts} attempts")]
    RateLimitExhausted { url: String, attempts: u32 },

    #[error("Request to {url} failed: {message}")]
    Network {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Processor {step} failed: {message}")]
    Patch { step: String, message: String },

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Archive error in {path:?}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl InstallError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        InstallError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        InstallError::Json {
            context: context.into(),
            source,
        }
    }

    pub fn archive(path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        InstallError::Archive {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Stable tag used in serialized error reports.
    pub fn error_type(&self) -> &'static str {
        match self {
            InstallError::UnsupportedLoader(_) => "UnsupportedLoaderError",
            InstallError::UnsupportedVersion { .. } => "UnsupportedVersionError",
            InstallError::BuildNotFound { .. } => "BuildNotFoundError",
            InstallError::InvalidInstaller(_) => "InvalidInstallerError",
            InstallError::Integrity { .. } => "IntegrityError",
            InstallError::LibraryUnavailable { .. } => "LibraryUnavailableError",
            InstallError::RateLimitExhausted { .. } => "RateLimitExhaustedError",
            InstallError::Network { .. } => "NetworkError",
            InstallError::Patch { .. } => "PatchError",
            InstallError::Io { .. } => "IoError",
            InstallError::Json { .. } => "JsonError",
            InstallError::Archive { .. } => "ArchiveError",
            InstallError::Configuration(_) => "ConfigurationError",
        }
    }

    /// Structured fields describing the failure.
    pub fn context(&self) -> Map<String, Value> {
        let value = match self {
            InstallError::UnsupportedLoader(loader) => json!({ "loader": loader }),
            InstallError::UnsupportedVersion { loader, version } => {
                json!({ "loader": loader, "version": version })
            }
            InstallError::BuildNotFound { build, available } => {
                json!({ "build": build, "availableBuilds": available })
            }
            InstallError::Integrity {
                path,
                algorithm,
                expected,
                actual,
            } => json!({
                "path": path,
                "algorithm": algorithm,
                "expected": expected,
                "actual": actual,
            }),
            InstallError::LibraryUnavailable { name, file } => {
                json!({ "library": name, "file": file })
            }
            InstallError::RateLimitExhausted { url, attempts } => {
                json!({ "url": url, "attempts": attempts })
            }
            InstallError::Network { url, status, .. } => json!({ "url": url, "status": status }),
            InstallError::Patch { step, .. } => json!({ "step": step }),
            InstallError::Io { path, .. } | InstallError::Archive { path, .. } => {
                json!({ "path": path })
            }
            InstallError::Json { context, .. } => json!({ "source": context }),
            InstallError::InvalidInstaller(_) | InstallError::Configuration(_) => json!({}),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl From<reqwest::Error> for InstallError {
    fn from(err: reqwest::Error) -> Self {
        InstallError::Network {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Attach the offending path to an `io::Error`.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| InstallError::io(path, e))
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dispatch,
    ResolveInstaller,
    ExtractProfile,
    WriteProfile,
    DownloadLibraries,
    Patch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Dispatch => "dispatch",
            Stage::ResolveInstaller => "resolve_installer",
            Stage::ExtractProfile => "extract_profile",
            Stage::WriteProfile => "write_profile",
            Stage::DownloadLibraries => "download_libraries",
            Stage::Patch => "patch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first error of an installation, labelled with its stage.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: InstallError,
}

impl StageError {
    pub fn new(stage: Stage, source: InstallError) -> Self {
        Self { stage, source }
    }

    pub fn to_tagged(&self) -> TaggedError {
        TaggedError {
            error: self.source.to_string(),
            error_type: self.source.error_type(),
            stage: self.stage,
            context: self.source.context(),
        }
    }
}

/// Serializable `{error, errorType, stage, ...context}` report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedError {
    pub error: String,
    pub error_type: &'static str,
    pub stage: Stage,
    #[serde(flatten)]
    pub context: Map<String, Value>,
}
