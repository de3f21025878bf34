//! Pre-installer Forge builds ship a plain archive that has to be merged
//! into the vanilla client jar.

use super::ResolvedInstaller;
use crate::error::{InstallError, IoResultExt, Result};
use crate::installer::profile::{read_version_profile, VersionProfile};
use crate::installer::types::{InstallContext, InstallEvent, ProgressReporter};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

fn is_signature(name: &str) -> bool {
    name.starts_with("META-INF/")
}

fn copy_entries<R: Read + Seek, W: Write + Seek>(
    source: &Path,
    archive: &mut ZipArchive<R>,
    writer: &mut ZipWriter<W>,
    skip: &HashSet<String>,
) -> Result<usize> {
    let options = SimpleFileOptions::default();
    let mut copied = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| InstallError::archive(source, e))?;
        let name = entry.name().to_string();
        if entry.is_dir() || is_signature(&name) || skip.contains(&name) {
            continue;
        }
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| InstallError::archive(source, e))?;
        std::io::copy(&mut entry, writer).with_path(source)?;
        copied += 1;
    }
    Ok(copied)
}

/// Write `vanilla` with every entry of `overlay` laid over it to `dest`.
/// Signature files from both archives are dropped.
pub fn merge_jars(vanilla: &Path, overlay: &Path, dest: &Path) -> Result<usize> {
    let open = |path: &Path| -> Result<ZipArchive<File>> {
        let file = File::open(path).with_path(path)?;
        ZipArchive::new(file).map_err(|e| InstallError::archive(path, e))
    };
    let mut vanilla_zip = open(vanilla)?;
    let mut overlay_zip = open(overlay)?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).with_path(parent)?;
    }
    let tmp = dest.with_extension("jar.part");
    let file = File::create(&tmp).with_path(&tmp)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));

    let overridden: HashSet<String> = overlay_zip.file_names().map(str::to_string).collect();
    let mut count = copy_entries(vanilla, &mut vanilla_zip, &mut writer, &overridden)?;
    count += copy_entries(overlay, &mut overlay_zip, &mut writer, &HashSet::new())?;

    let mut inner = writer.finish().map_err(|e| InstallError::archive(dest, e))?;
    inner.flush().with_path(&tmp)?;
    drop(inner);
    std::fs::rename(&tmp, dest).with_path(dest)?;
    Ok(count)
}

/// Build the merged client jar and the profile that points at it.
///
/// The profile is the vanilla version document with its libraries emptied,
/// renamed to `forge-<build>` and flagged with `isOldForge` and `jarPath`.
pub async fn build_legacy_profile(
    ctx: &InstallContext,
    installer: &ResolvedInstaller,
    reporter: &dyn ProgressReporter,
) -> Result<VersionProfile> {
    let id = installer.legacy_id();
    let jar_path: PathBuf = ctx.version_dir(&id).join(format!("{}.jar", id));
    log::info!("Merging {:?} into the vanilla client jar", installer.path);

    reporter.report(InstallEvent::Extract {
        label: format!("{}.jar", id),
    });

    let vanilla = ctx.minecraft_jar.clone();
    let overlay = installer.path.clone();
    let dest = jar_path.clone();
    let count = tokio::task::spawn_blocking(move || merge_jars(&vanilla, &overlay, &dest))
        .await
        .map_err(|e| InstallError::archive(&jar_path, e))??;
    log::debug!("Wrote {} entries to {:?}", count, jar_path);

    let mut profile = read_version_profile(&ctx.minecraft_json).await?;
    profile.id = id;
    profile.libraries.clear();
    profile.processors.clear();
    profile.extra.insert("isOldForge".to_string(), Value::Bool(true));
    profile.extra.insert(
        "jarPath".to_string(),
        Value::String(jar_path.to_string_lossy().to_string()),
    );
    Ok(profile)
}
