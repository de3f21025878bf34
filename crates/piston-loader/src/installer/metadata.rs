//! Build metadata lookup for every loader.

use crate::error::{InstallError, Result};
use crate::installer::config::{fill_template, ProfileLoaderEndpoints, FETCH_JSON_MAX_RETRIES};
use crate::installer::core::http::{fetch_json, FetchOptions};
use crate::installer::types::{BuildSelector, InstallContext};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Published builds of one loader for one game version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMetadata {
    pub loader: String,
    pub version: String,
    /// In upstream order.
    pub builds: Vec<String>,
    /// Symbolic name (`<version>-latest`, `<version>-recommended`) to build token.
    pub promotions: HashMap<String, String>,
}

impl BuildMetadata {
    fn promotion(&self, kind: &str) -> Option<&str> {
        self.promotions
            .get(&format!("{}-{}", self.version, kind))
            .map(String::as_str)
    }

    fn not_found(&self, build: &str) -> InstallError {
        InstallError::BuildNotFound {
            build: build.to_string(),
            available: self.builds.clone(),
        }
    }
}

/// Pick the concrete build id for `selector`.
///
/// Symbolic selectors go through the promotions map; `recommended` falls
/// back to the `latest` promotion. A promoted token selects the first build
/// containing it.
pub fn resolve_build(metadata: &BuildMetadata, selector: &BuildSelector) -> Result<String> {
    if metadata.builds.is_empty() {
        return Err(InstallError::UnsupportedVersion {
            loader: metadata.loader.clone(),
            version: metadata.version.clone(),
        });
    }

    let (requested, token) = match selector {
        BuildSelector::Explicit(build) => {
            return metadata
                .builds
                .iter()
                .find(|b| *b == build)
                .cloned()
                .ok_or_else(|| metadata.not_found(build));
        }
        BuildSelector::Latest => ("latest", metadata.promotion("latest")),
        BuildSelector::Recommended => (
            "recommended",
            metadata
                .promotion("recommended")
                .or_else(|| metadata.promotion("latest")),
        ),
    };

    let Some(token) = token else {
        return Err(metadata.not_found(requested));
    };

    metadata
        .builds
        .iter()
        .find(|b| b.contains(token))
        .cloned()
        .ok_or_else(|| metadata.not_found(token))
}

async fn get_json<T: serde::de::DeserializeOwned>(ctx: &InstallContext, url: &str) -> Result<T> {
    fetch_json(&ctx.client, url, &FetchOptions::default(), FETCH_JSON_MAX_RETRIES).await
}

#[derive(Debug, Deserialize)]
struct ForgePromotions {
    #[serde(default)]
    promos: HashMap<String, String>,
}

/// Forge builds from `maven-metadata.json`, with promotions when the
/// selector is symbolic.
pub async fn fetch_forge_metadata(ctx: &InstallContext) -> Result<BuildMetadata> {
    let endpoints = &ctx.endpoints.forge;
    let mut all: HashMap<String, Vec<String>> = get_json(ctx, &endpoints.metadata).await?;
    let builds = all.remove(&ctx.game_version).unwrap_or_default();
    log::debug!("Forge lists {} builds for {}", builds.len(), ctx.game_version);

    let promotions = if matches!(ctx.build, BuildSelector::Explicit(_)) || builds.is_empty() {
        HashMap::new()
    } else {
        get_json::<ForgePromotions>(ctx, &endpoints.promotions).await?.promos
    };

    Ok(BuildMetadata {
        loader: "Forge".to_string(),
        version: ctx.game_version.clone(),
        builds,
        promotions,
    })
}

/// Per-build Forge file table (`meta.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct ForgeBuildMeta {
    /// Classifier -> extension -> md5.
    #[serde(default)]
    pub classifiers: BTreeMap<String, BTreeMap<String, String>>,
}

/// The file to download for a Forge build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerArtifact {
    pub classifier: String,
    pub url: String,
    pub extension: String,
    pub md5: String,
}

impl InstallerArtifact {
    pub fn file_name(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.path_segments().and_then(|s| s.last().map(str::to_string)))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.url.rsplit('/').next().unwrap_or_default().to_string())
    }
}

pub async fn fetch_forge_build_meta(ctx: &InstallContext, build: &str) -> Result<ForgeBuildMeta> {
    let url = fill_template(&ctx.endpoints.forge.meta, &[("build", build)]);
    get_json(ctx, &url).await
}

/// Choose installer, else client, else universal from a build's file table.
pub fn select_forge_artifact(
    ctx: &InstallContext,
    build: &str,
    meta: &ForgeBuildMeta,
) -> Result<InstallerArtifact> {
    let endpoints = &ctx.endpoints.forge;
    let candidates = [
        ("installer", &endpoints.installer),
        ("client", &endpoints.client),
        ("universal", &endpoints.universal),
    ];

    for (classifier, template) in candidates {
        let Some(files) = meta.classifiers.get(classifier) else {
            continue;
        };
        let extension = ["jar", "zip"]
            .iter()
            .find(|ext| files.contains_key(**ext))
            .map(|ext| ext.to_string())
            .or_else(|| files.keys().next().cloned());
        let Some(extension) = extension else {
            continue;
        };
        let md5 = files.get(&extension).cloned().unwrap_or_default();
        let base = fill_template(template, &[("version", build)]);
        return Ok(InstallerArtifact {
            classifier: classifier.to_string(),
            url: format!("{}.{}", base, extension),
            extension,
            md5,
        });
    }

    Err(InstallError::InvalidInstaller(format!(
        "Forge build {} publishes no installer, client or universal file",
        build
    )))
}

#[derive(Debug, Deserialize)]
struct MavenVersions {
    #[serde(default)]
    versions: Vec<String>,
}

/// NeoForge builds and whether they come from the legacy `forge` artifact.
pub async fn fetch_neoforge_metadata(ctx: &InstallContext) -> Result<(BuildMetadata, bool)> {
    let endpoints = &ctx.endpoints.neoforge;
    let version = &ctx.game_version;

    let legacy_prefix = format!("{}-", version);
    let legacy = match get_json::<MavenVersions>(ctx, &endpoints.legacy_metadata).await {
        Ok(list) => list
            .versions
            .into_iter()
            .filter(|v| v.contains(&legacy_prefix))
            .collect::<Vec<_>>(),
        Err(e) => {
            log::warn!("NeoForge legacy version list unavailable: {}", e);
            Vec::new()
        }
    };

    let (builds, is_legacy) = if !legacy.is_empty() {
        (legacy, true)
    } else {
        let prefix = neoforge_prefix(version);
        let current: MavenVersions = get_json(ctx, &endpoints.metadata).await?;
        let builds = current
            .versions
            .into_iter()
            .filter(|v| prefix.as_deref().map(|p| v.starts_with(p)).unwrap_or(false))
            .collect::<Vec<_>>();
        (builds, false)
    };

    let mut promotions = HashMap::new();
    if let Some(last) = builds.last() {
        promotions.insert(format!("{}-latest", version), last.clone());
        promotions.insert(format!("{}-recommended", version), last.clone());
    }

    Ok((
        BuildMetadata {
            loader: "NeoForge".to_string(),
            version: version.clone(),
            builds,
            promotions,
        },
        is_legacy,
    ))
}

/// `1.20.4` -> `20.4.`, `1.21` -> `21.0.`
fn neoforge_prefix(game_version: &str) -> Option<String> {
    let mut parts = game_version.split('.').skip(1);
    let minor = parts.next().filter(|p| !p.is_empty())?;
    let patch = parts.next().unwrap_or("0");
    Some(format!("{}.{}.", minor, patch))
}

/// How a profile-JSON loader marks stable builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StableMarker {
    /// Explicit `stable` flag (Fabric, LegacyFabric).
    Flag,
    /// No `-beta` in the version (Quilt).
    NotBeta,
}

#[derive(Debug, Deserialize)]
struct GameVersionEntry {
    version: String,
}

#[derive(Debug, Deserialize)]
struct LoaderVersionEntry {
    version: String,
    #[serde(default)]
    stable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LoaderVersions {
    #[serde(default)]
    game: Vec<GameVersionEntry>,
    #[serde(default)]
    loader: Vec<LoaderVersionEntry>,
}

/// Loader builds of a Fabric-style meta service.
///
/// The game version must be listed; otherwise the build list is empty.
pub async fn fetch_profile_loader_metadata(
    ctx: &InstallContext,
    loader: &str,
    endpoints: &ProfileLoaderEndpoints,
    marker: StableMarker,
) -> Result<BuildMetadata> {
    let meta: LoaderVersions = get_json(ctx, &endpoints.metadata).await?;
    let version = &ctx.game_version;

    if !meta.game.iter().any(|g| &g.version == version) {
        log::warn!("{} does not list Minecraft {}", loader, version);
        return Ok(BuildMetadata {
            loader: loader.to_string(),
            version: version.clone(),
            ..Default::default()
        });
    }

    let is_stable = |entry: &LoaderVersionEntry| match marker {
        StableMarker::Flag => entry.stable.unwrap_or(false),
        StableMarker::NotBeta => !entry.version.contains("beta"),
    };

    let mut promotions = HashMap::new();
    if let Some(first) = meta.loader.first() {
        promotions.insert(format!("{}-latest", version), first.version.clone());
    }
    if let Some(stable) = meta.loader.iter().find(|e| is_stable(*e)) {
        promotions.insert(format!("{}-recommended", version), stable.version.clone());
    }

    Ok(BuildMetadata {
        loader: loader.to_string(),
        version: version.clone(),
        builds: meta.loader.into_iter().map(|e| e.version).collect(),
        promotions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forge_metadata() -> BuildMetadata {
        let mut promotions = HashMap::new();
        promotions.insert("1.20.1-latest".to_string(), "47.2.20".to_string());
        promotions.insert("1.20.1-recommended".to_string(), "47.2.0".to_string());
        promotions.insert("1.19.2-latest".to_string(), "43.3.5".to_string());
        BuildMetadata {
            loader: "Forge".to_string(),
            version: "1.20.1".to_string(),
            builds: vec![
                "1.20.1-47.2.20".to_string(),
                "1.20.1-47.2.0".to_string(),
                "1.20.1-47.1.0".to_string(),
            ],
            promotions,
        }
    }

    #[test]
    fn recommended_uses_promotion() {
        let build = resolve_build(&forge_metadata(), &BuildSelector::Recommended).unwrap();
        assert_eq!(build, "1.20.1-47.2.0");
        let build = resolve_build(&forge_metadata(), &BuildSelector::Latest).unwrap();
        assert_eq!(build, "1.20.1-47.2.20");
    }

    #[test]
    fn recommended_falls_back_to_latest() {
        let mut meta = forge_metadata();
        meta.promotions.remove("1.20.1-recommended");
        let build = resolve_build(&meta, &BuildSelector::Recommended).unwrap();
        assert_eq!(build, "1.20.1-47.2.20");
    }

    #[test]
    fn missing_build_lists_available() {
        let err = resolve_build(&forge_metadata(), &BuildSelector::Explicit("1.20.1-99.0.0".into()))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Build 1.20.1-99.0.0 not found, Available builds: 1.20.1-47.2.20, 1.20.1-47.2.0, 1.20.1-47.1.0"
        );

        let mut meta = forge_metadata();
        meta.promotions.clear();
        let err = resolve_build(&meta, &BuildSelector::Recommended).unwrap_err();
        assert!(matches!(err, InstallError::BuildNotFound { ref build, .. } if build == "recommended"));
    }

    #[test]
    fn promotion_picks_first_build_containing_token() {
        let mut promotions = HashMap::new();
        promotions.insert("1.20.1-latest".to_string(), "0.15.1".to_string());
        let meta = BuildMetadata {
            loader: "Fabric".to_string(),
            version: "1.20.1".to_string(),
            builds: vec!["0.14.9".to_string(), "0.15.10".to_string(), "0.15.1".to_string()],
            promotions,
        };
        assert_eq!(resolve_build(&meta, &BuildSelector::Latest).unwrap(), "0.15.10");
    }

    #[test]
    fn empty_build_list_is_unsupported() {
        let meta = BuildMetadata {
            loader: "Quilt".to_string(),
            version: "1.2.5".to_string(),
            ..Default::default()
        };
        let err = resolve_build(&meta, &BuildSelector::Latest).unwrap_err();
        assert_eq!(err.to_string(), "Quilt doesn't support Minecraft 1.2.5");
    }

    #[test]
    fn neoforge_prefix_from_game_version() {
        assert_eq!(neoforge_prefix("1.20.4").as_deref(), Some("20.4."));
        assert_eq!(neoforge_prefix("1.21").as_deref(), Some("21.0."));
        assert_eq!(neoforge_prefix("24w14a"), None);
    }

    #[test]
    fn installer_file_name_from_url() {
        let artifact = InstallerArtifact {
            classifier: "installer".to_string(),
            url: "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar".to_string(),
            extension: "jar".to_string(),
            md5: String::new(),
        };
        assert_eq!(artifact.file_name(), "forge-1.20.1-47.2.0-installer.jar");
    }
}
