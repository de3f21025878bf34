//! Centralized installer settings.
//! Upstream endpoints are grouped in [`Endpoints`] so a caller (or a test) can
//! point every loader at another host.

use serde::{Deserialize, Serialize};

pub const REQUEST_TIMEOUT_SECS: u64 = 120;
pub const PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const FETCH_JSON_MAX_RETRIES: u32 = 5;
pub const PROCESSOR_TIMEOUT_SECS: u64 = 300;

// URL Constants
pub const FORGE_METADATA_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/maven-metadata.json";
pub const FORGE_META_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/${build}/meta.json";
pub const FORGE_PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";
pub const FORGE_INSTALLER_URL: &str =
    "https://maven.minecraftforge.net/net/minecraftforge/forge/${version}/forge-${version}-installer";
pub const FORGE_CLIENT_URL: &str =
    "https://maven.minecraftforge.net/net/minecraftforge/forge/${version}/forge-${version}-client";
pub const FORGE_UNIVERSAL_URL: &str =
    "https://maven.minecraftforge.net/net/minecraftforge/forge/${version}/forge-${version}-universal";

pub const NEOFORGE_LEGACY_METADATA_URL: &str =
    "https://maven.neoforged.net/api/maven/versions/releases/net/neoforged/forge";
pub const NEOFORGE_METADATA_URL: &str =
    "https://maven.neoforged.net/api/maven/versions/releases/net/neoforged/neoforge";
pub const NEOFORGE_LEGACY_INSTALLER_URL: &str =
    "https://maven.neoforged.net/releases/net/neoforged/forge/${version}/forge-${version}-installer.jar";
pub const NEOFORGE_INSTALLER_URL: &str =
    "https://maven.neoforged.net/releases/net/neoforged/neoforge/${version}/neoforge-${version}-installer.jar";

pub const FABRIC_META_URL: &str = "https://meta.fabricmc.net/v2/versions";
pub const FABRIC_PROFILE_URL: &str =
    "https://meta.fabricmc.net/v2/versions/loader/${version}/${build}/profile/json";
pub const LEGACY_FABRIC_META_URL: &str = "https://meta.legacyfabric.net/v2/versions";
pub const LEGACY_FABRIC_PROFILE_URL: &str =
    "https://meta.legacyfabric.net/v2/versions/loader/${version}/${build}/profile/json";
pub const QUILT_META_URL: &str = "https://meta.quiltmc.org/v3/versions";
pub const QUILT_PROFILE_URL: &str =
    "https://meta.quiltmc.org/v3/versions/loader/${version}/${build}/profile/json";

/// Library hosts probed, in order, when a library has no usable direct URL.
pub const DEFAULT_MIRRORS: [&str; 5] = [
    "https://maven.minecraftforge.net",
    "https://maven.neoforged.net/releases",
    "https://maven.creeperhost.net",
    "https://libraries.minecraft.net",
    "https://repo1.maven.org/maven2",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeEndpoints {
    pub metadata: String,
    /// `${build}` is replaced by the full build id.
    pub meta: String,
    pub promotions: String,
    /// `${version}` is replaced by the full build id; the extension is appended.
    pub installer: String,
    pub client: String,
    pub universal: String,
}

impl Default for ForgeEndpoints {
    fn default() -> Self {
        Self {
            metadata: FORGE_METADATA_URL.to_string(),
            meta: FORGE_META_URL.to_string(),
            promotions: FORGE_PROMOTIONS_URL.to_string(),
            installer: FORGE_INSTALLER_URL.to_string(),
            client: FORGE_CLIENT_URL.to_string(),
            universal: FORGE_UNIVERSAL_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeoForgeEndpoints {
    pub legacy_metadata: String,
    pub metadata: String,
    pub legacy_installer: String,
    pub installer: String,
}

impl Default for NeoForgeEndpoints {
    fn default() -> Self {
        Self {
            legacy_metadata: NEOFORGE_LEGACY_METADATA_URL.to_string(),
            metadata: NEOFORGE_METADATA_URL.to_string(),
            legacy_installer: NEOFORGE_LEGACY_INSTALLER_URL.to_string(),
            installer: NEOFORGE_INSTALLER_URL.to_string(),
        }
    }
}

/// Endpoints of a loader distributed as a profile JSON (Fabric and friends).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileLoaderEndpoints {
    pub metadata: String,
    /// `${version}` and `${build}` are replaced by game version and loader build.
    pub profile: String,
}

impl ProfileLoaderEndpoints {
    pub fn new(metadata: &str, profile: &str) -> Self {
        Self {
            metadata: metadata.to_string(),
            profile: profile.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
    pub forge: ForgeEndpoints,
    pub neoforge: NeoForgeEndpoints,
    pub fabric: ProfileLoaderEndpoints,
    pub legacy_fabric: ProfileLoaderEndpoints,
    pub quilt: ProfileLoaderEndpoints,
    pub mirrors: Vec<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            forge: ForgeEndpoints::default(),
            neoforge: NeoForgeEndpoints::default(),
            fabric: ProfileLoaderEndpoints::new(FABRIC_META_URL, FABRIC_PROFILE_URL),
            legacy_fabric: ProfileLoaderEndpoints::new(
                LEGACY_FABRIC_META_URL,
                LEGACY_FABRIC_PROFILE_URL,
            ),
            quilt: ProfileLoaderEndpoints::new(QUILT_META_URL, QUILT_PROFILE_URL),
            mirrors: DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Replace every `${key}` placeholder in an endpoint template.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("${{{}}}", key), value)
    })
}
