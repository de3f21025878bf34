//! Reading Forge/NeoForge installer jars.

use crate::error::{InstallError, IoResultExt, Result};
use crate::installer::core::archive::ArchiveReader;
use crate::installer::core::library::to_storage_path;
use crate::installer::profile::{parse, InstallManifest, InstallProfile, VersionProfile};
use crate::installer::types::{InstallContext, InstallEvent, ProgressReporter};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const INSTALL_PROFILE: &str = "install_profile.json";
const DEFAULT_VERSION_ENTRY: &str = "version.json";
const CLIENT_DATA_ENTRY: &str = "data/client.lzma";

/// What the universal jar extraction left on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniversalJar {
    /// The loader's own artifacts were written into the library store.
    pub provided: bool,
    /// Extracted `data/client.lzma`.
    pub binpatch: Option<PathBuf>,
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value, context: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| InstallError::json(context, e))
}

/// Extract and parse `install_profile.json` and its version profile.
///
/// Old installers nest both documents (`install` + `versionInfo`); newer ones
/// keep the version profile in a separate entry named by `json`.
pub async fn read_install_profile(reader: &dyn ArchiveReader) -> Result<InstallProfile> {
    log::debug!("Parsing {} from installer", INSTALL_PROFILE);

    let bytes = reader.read_entry(INSTALL_PROFILE).await?.ok_or_else(|| {
        InstallError::InvalidInstaller(format!("{} not found in installer jar", INSTALL_PROFILE))
    })?;
    let mut document: Value = parse(&bytes, INSTALL_PROFILE)?;

    if let Some(install) = document.get_mut("install").map(Value::take) {
        let install: InstallManifest = from_value(install, "install_profile.json install")?;
        let version = document
            .get_mut("versionInfo")
            .map(Value::take)
            .ok_or_else(|| {
                InstallError::InvalidInstaller("versionInfo missing from legacy install profile".into())
            })?;
        let version: VersionProfile = from_value(version, "install_profile.json versionInfo")?;
        log::debug!("Parsed legacy install profile for {}", version.id);
        return Ok(InstallProfile { install, version });
    }

    let install: InstallManifest = from_value(document, INSTALL_PROFILE)?;
    let entry = install
        .json
        .as_deref()
        .and_then(|json| json.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_VERSION_ENTRY)
        .to_string();

    let bytes = reader.read_entry(&entry).await?.ok_or_else(|| {
        InstallError::InvalidInstaller(format!("{} not found in installer jar", entry))
    })?;
    let version: VersionProfile = parse(&bytes, &entry)?;

    log::debug!(
        "Parsed install profile: version={}, processors={}, libraries={}",
        version.id,
        install.processors.len(),
        install.libraries.len()
    );
    Ok(InstallProfile { install, version })
}

async fn write_entry(reader: &dyn ArchiveReader, name: &str, dest: &Path) -> Result<bool> {
    let Some(bytes) = reader.read_entry(name).await? else {
        return Ok(false);
    };
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.with_path(parent)?;
    }
    tokio::fs::write(dest, bytes).await.with_path(dest)?;
    Ok(true)
}

/// Copy the loader's embedded jars into the library store.
///
/// `filePath` names a single entry stored at the `path` coordinate; otherwise
/// everything under `maven/<path dir>/` is copied. When processors are
/// declared, `data/client.lzma` lands next to the universal jar as
/// `<artifact>-clientdata.lzma`.
pub async fn extract_universal(
    ctx: &InstallContext,
    reader: &dyn ArchiveReader,
    install: &InstallManifest,
    universal_prefix: &str,
    reporter: &dyn ProgressReporter,
) -> Result<UniversalJar> {
    let mut result = UniversalJar::default();

    match (&install.file_path, &install.path) {
        (Some(file_path), path) => {
            let coords = path.as_deref().ok_or_else(|| {
                InstallError::InvalidInstaller("install profile declares filePath without path".into())
            })?;
            let storage = to_storage_path(coords, "", None)?;
            let dest = ctx.library_path(storage.relative());
            reporter.report(InstallEvent::Extract {
                label: file_path.clone(),
            });
            if !write_entry(reader, file_path, &dest).await? {
                return Err(InstallError::InvalidInstaller(format!(
                    "{} not found in installer jar",
                    file_path
                )));
            }
            log::debug!("Extracted {} -> {:?}", file_path, dest);
            result.provided = true;
        }
        (None, Some(coords)) => {
            let storage = to_storage_path(coords, "", None)?;
            let prefix = format!("maven/{}/", storage.dir);
            let entries = reader.list_entries_under(&prefix).await?;
            for entry in &entries {
                let Some(relative) = entry.strip_prefix("maven/") else {
                    continue;
                };
                reporter.report(InstallEvent::Extract {
                    label: entry.clone(),
                });
                write_entry(reader, entry, &ctx.library_path(relative)).await?;
            }
            log::debug!("Extracted {} embedded files under {}", entries.len(), prefix);
            result.provided = true;
        }
        (None, None) => {
            log::debug!("Installer embeds no universal jar");
        }
    }

    if install.processors.is_empty() {
        return Ok(result);
    }

    let universal = install.path.clone().or_else(|| {
        install
            .libraries
            .iter()
            .find(|lib| lib.name.starts_with(universal_prefix))
            .map(|lib| lib.name.clone())
    });
    let Some(universal) = universal else {
        return Err(InstallError::InvalidInstaller(format!(
            "no library matches {} for client data",
            universal_prefix
        )));
    };

    let storage = to_storage_path(&universal, "-clientdata", Some("lzma"))?;
    let dest = ctx.library_path(storage.relative());
    reporter.report(InstallEvent::Extract {
        label: CLIENT_DATA_ENTRY.to_string(),
    });
    if write_entry(reader, CLIENT_DATA_ENTRY, &dest).await? {
        log::debug!("Extracted client data -> {:?}", dest);
        result.binpatch = Some(dest);
    } else {
        log::warn!("Installer has no {}", CLIENT_DATA_ENTRY);
    }

    Ok(result)
}

/// Extract `/`-prefixed client data entries consumed by processors.
///
/// Returns the data value (as written in the manifest) mapped to the file
/// it was written to.
pub async fn extract_data_files(
    ctx: &InstallContext,
    reader: &dyn ArchiveReader,
    install: &InstallManifest,
    version_id: &str,
    binpatch: Option<&Path>,
    reporter: &dyn ProgressReporter,
) -> Result<HashMap<String, PathBuf>> {
    let mut extracted = HashMap::new();
    if install.processors.is_empty() {
        return Ok(extracted);
    }

    let data_dir = ctx.loader_dir().join("data").join(version_id);
    for (key, entry) in &install.data {
        let value = &entry.client;
        let Some(name) = value.strip_prefix('/') else {
            continue;
        };
        if key == "BINPATCH" && binpatch.is_some() {
            continue;
        }

        let dest = data_dir.join(name);
        reporter.report(InstallEvent::Extract {
            label: name.to_string(),
        });
        if !write_entry(reader, name, &dest).await? {
            return Err(InstallError::InvalidInstaller(format!(
                "data entry {} ({}) not found in installer jar",
                key, name
            )));
        }
        extracted.insert(value.clone(), dest);
    }

    Ok(extracted)
}
