//! Modrinth `.mrpack` archives: a zip holding `modrinth.index.json` plus
//! `overrides/` trees copied verbatim into the server directory.

use std::{
    collections::HashMap,
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::ArtifactError,
    http::HttpClient,
    manifests::fabric,
    utils::normalize_rel_path,
};

const INDEX_NAME: &str = "modrinth.index.json";
const OVERRIDE_ROOTS: [&str; 2] = ["overrides/", "server-overrides/"];
const FABRIC_SERVER_JAR: &str = "fabric-server.jar";

/// What a modpack declares about the runtime it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModpackInfo {
    pub name: Option<String>,
    pub minecraft: String,
    pub loader: Option<String>,
    pub loader_version: Option<String>,
}

#[async_trait]
pub trait ArchiveInstaller: Send + Sync + Debug {
    /// Materializes the archive's server file tree into `dest`.
    async fn install(&self, archive: &Path, dest: &Path) -> Result<ModpackInfo, ArtifactError>;

    async fn inspect(&self, archive: &Path) -> Result<ModpackInfo, ArtifactError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MrpackIndex {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    files: Vec<MrpackFile>,
    #[serde(default)]
    dependencies: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MrpackFile {
    path: String,
    #[serde(default)]
    downloads: Vec<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    env: Option<MrpackEnv>,
}

#[derive(Debug, Deserialize)]
struct MrpackEnv {
    #[serde(default)]
    server: Option<String>,
}

impl MrpackFile {
    fn wanted_on_server(&self) -> bool {
        let mode = self
            .env
            .as_ref()
            .and_then(|e| e.server.as_deref())
            .map(|s| s.trim().to_ascii_lowercase());
        mode.as_deref() != Some("unsupported")
    }
}

impl MrpackIndex {
    fn info(&self) -> Result<ModpackInfo, ArtifactError> {
        let minecraft = self
            .dependencies
            .get("minecraft")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ArtifactError::InvalidArchive("missing minecraft dependency".to_string())
            })?;

        let loader = ["fabric-loader", "quilt-loader", "forge", "neoforge"]
            .iter()
            .find_map(|key| self.dependencies.get(*key).map(|v| (*key, v)));

        Ok(ModpackInfo {
            name: self.name.clone(),
            minecraft,
            loader: loader.map(|(key, _)| key.trim_end_matches("-loader").to_string()),
            loader_version: loader.map(|(_, v)| v.trim().to_string()),
        })
    }
}

fn archive_err(archive: &Path, reason: impl std::fmt::Display) -> ArtifactError {
    ArtifactError::InvalidArchive(format!("{}: {reason}", archive.display()))
}

fn io_err(path: &Path, reason: impl std::fmt::Display) -> ArtifactError {
    ArtifactError::Io(format!("{}: {reason}", path.display()))
}

fn open_archive(archive: &Path) -> Result<zip::ZipArchive<fs::File>, ArtifactError> {
    let file = fs::File::open(archive).map_err(|e| io_err(archive, e))?;
    zip::ZipArchive::new(file).map_err(|e| archive_err(archive, e))
}

fn read_index(archive: &Path) -> Result<MrpackIndex, ArtifactError> {
    let mut zip = open_archive(archive)?;
    let mut entry = zip
        .by_name(INDEX_NAME)
        .map_err(|_| archive_err(archive, format!("missing {INDEX_NAME}")))?;

    let mut buf = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut buf).map_err(|e| archive_err(archive, e))?;
    serde_json::from_slice(&buf).map_err(|e| archive_err(archive, e))
}

/// Copies `overrides/` then `server-overrides/` into `dest`, returning the
/// number of files written.
fn extract_overrides(archive: &Path, dest: &Path) -> Result<usize, ArtifactError> {
    let mut zip = open_archive(archive)?;
    let mut written = 0;

    for root in OVERRIDE_ROOTS {
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| archive_err(archive, e))?;
            let name = entry.name().to_string();
            let Some(rest) = name.strip_prefix(root) else {
                continue;
            };
            let rest = rest.trim_end_matches('/');
            if rest.is_empty() {
                continue;
            }

            let rel = normalize_rel_path(rest)
                .ok_or_else(|| archive_err(archive, format!("unsafe entry path {name}")))?;
            let out_path = dest.join(&rel);

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| io_err(&out_path, e))?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }

            let mut out = fs::File::create(&out_path).map_err(|e| io_err(&out_path, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| io_err(&out_path, e))?;
            written += 1;
        }
    }

    Ok(written)
}

async fn blocking<T, F>(f: F) -> Result<T, ArtifactError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ArtifactError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ArtifactError::Io(e.to_string()))?
}

/// Zip-based installer for Modrinth packs.
#[derive(Debug, Clone)]
pub struct MrpackInstaller {
    http: Arc<dyn HttpClient>,
    fabric_base: String,
}

impl MrpackInstaller {
    pub fn new(http: Arc<dyn HttpClient>, fabric_base: String) -> Self {
        Self { http, fabric_base }
    }

    async fn download_files(&self, index: &MrpackIndex, dest: &Path) -> Result<(), ArtifactError> {
        for file in index.files.iter().filter(|f| f.wanted_on_server()) {
            let rel = normalize_rel_path(&file.path).ok_or_else(|| {
                ArtifactError::InvalidArchive(format!("unsafe file path {}", file.path))
            })?;
            if rel.as_os_str().is_empty() {
                continue;
            }

            let target = dest.join(&rel);
            if let (Ok(meta), Some(expected)) = (tokio::fs::metadata(&target).await, file.file_size)
                && meta.is_file()
                && meta.len() == expected
            {
                continue;
            }

            let url = file
                .downloads
                .iter()
                .map(|s| s.trim())
                .find(|s| !s.is_empty())
                .ok_or_else(|| {
                    ArtifactError::InvalidArchive(format!("no download url for {}", file.path))
                })?;
            debug!(path = %file.path, %url, "fetching modpack file");
            self.http.download(url, &target).await?;
        }
        Ok(())
    }

    async fn fetch_fabric_server(
        &self,
        info: &ModpackInfo,
        dest: &Path,
    ) -> Result<(), ArtifactError> {
        let Some(loader_version) = info.loader_version.as_deref() else {
            return Ok(());
        };
        let target = dest.join(FABRIC_SERVER_JAR);
        if target.is_file() {
            return Ok(());
        }

        let installer = fabric::latest_installer(self.http.as_ref(), &self.fabric_base)
            .await?
            .ok_or_else(|| ArtifactError::Io("no fabric installer versions".to_string()))?;
        let url = fabric::server_jar_url(&self.fabric_base, &info.minecraft, loader_version, &installer);
        self.http.download(&url, &target).await?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveInstaller for MrpackInstaller {
    async fn install(&self, archive: &Path, dest: &Path) -> Result<ModpackInfo, ArtifactError> {
        let archive_owned: PathBuf = archive.to_path_buf();
        let index = blocking(move || read_index(&archive_owned)).await?;
        let info = index.info()?;

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| io_err(dest, e))?;

        self.download_files(&index, dest).await?;

        let (archive_owned, dest_owned) = (archive.to_path_buf(), dest.to_path_buf());
        let extracted = blocking(move || extract_overrides(&archive_owned, &dest_owned)).await?;

        if info.loader.as_deref() == Some("fabric") {
            self.fetch_fabric_server(&info, dest).await?;
        }

        info!(
            archive = %archive.display(),
            minecraft = %info.minecraft,
            loader = info.loader.as_deref().unwrap_or("none"),
            files = index.files.len(),
            overrides = extracted,
            "modpack installed"
        );
        Ok(info)
    }

    async fn inspect(&self, archive: &Path) -> Result<ModpackInfo, ArtifactError> {
        let archive = archive.to_path_buf();
        blocking(move || read_index(&archive)?.info()).await
    }
}
