//! Read access to installer and processor jars.

use crate::error::{InstallError, IoResultExt, Result};
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Random access to the entries of an archive.
pub trait ArchiveReader: Send + Sync {
    /// Bytes of `name`, or `None` when the entry does not exist.
    fn read_entry<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    /// Every file entry whose name starts with `prefix`, in archive order.
    fn list_entries_under<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Zip-backed reader. The entry listing is read once and shared by clones.
#[derive(Debug, Clone)]
pub struct ZipArchiveReader {
    path: PathBuf,
    entries: Arc<OnceCell<Vec<String>>>,
}

impl ZipArchiveReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Arc::new(OnceCell::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<zip::ZipArchive<std::fs::File>> {
        let file = std::fs::File::open(path).with_path(path)?;
        zip::ZipArchive::new(file).map_err(|e| InstallError::archive(path, e))
    }

    async fn entries(&self) -> Result<&[String]> {
        if let Some(entries) = self.entries.get() {
            return Ok(entries);
        }

        let path = self.path.clone();
        let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let archive = Self::open(&path)?;
            Ok(archive
                .file_names()
                .filter(|name| !name.ends_with('/'))
                .map(|name| name.to_string())
                .collect())
        })
        .await
        .map_err(|e| InstallError::archive(&self.path, e))??;

        log::debug!("Indexed {} entries in {:?}", names.len(), self.path);
        Ok(self.entries.get_or_init(|| names))
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.entries().await?.iter().any(|entry| entry == name))
    }

    async fn read_entry_inner(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !self.contains(name).await? {
            return Ok(None);
        }

        let path = self.path.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>> {
            let mut archive = Self::open(&path)?;
            let mut entry = match archive.by_name(&name) {
                Ok(entry) => entry,
                Err(zip::result::ZipError::FileNotFound) => return Ok(None),
                Err(e) => return Err(InstallError::archive(&path, e)),
            };
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf).with_path(&path)?;
            Ok(Some(buf))
        })
        .await
        .map_err(|e| InstallError::archive(&self.path, e))?
    }

    /// Write entry `name` to `dest`, creating parent directories.
    /// Returns false when the entry does not exist.
    pub async fn extract_entry(&self, name: &str, dest: &Path) -> Result<bool> {
        let Some(bytes) = self.read_entry_inner(name).await? else {
            return Ok(false);
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.with_path(parent)?;
        }
        tokio::fs::write(dest, bytes).await.with_path(dest)?;
        Ok(true)
    }

    /// `Main-Class` attribute of the jar manifest.
    pub async fn main_class(&self) -> Result<String> {
        let manifest = self
            .read_entry_inner("META-INF/MANIFEST.MF")
            .await?
            .ok_or_else(|| InstallError::archive(&self.path, "MANIFEST.MF not found in jar"))?;

        parse_main_class(&String::from_utf8_lossy(&manifest))
            .ok_or_else(|| InstallError::archive(&self.path, "Main-Class attribute not found in manifest"))
    }
}

fn parse_main_class(manifest: &str) -> Option<String> {
    manifest
        .lines()
        .find_map(|line| line.strip_prefix("Main-Class:"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl ArchiveReader for ZipArchiveReader {
    fn read_entry<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(self.read_entry_inner(name))
    }

    fn list_entries_under<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            Ok(self
                .entries()
                .await?
                .iter()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect())
        })
    }
}
