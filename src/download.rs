//! Materializes resolved artifacts inside a server's working directory.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex},
};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    config::{ServerType, ServerVersion},
    error::{ArtifactError, FetchError},
    http::HttpClient,
    manifests::{ArtifactResolver, ResolvedArtifact},
    utils::{find_server_jar, is_plain_file_name},
};

pub mod mrpack;

pub use mrpack::{ArchiveInstaller, ModpackInfo, MrpackInstaller};

/// A file fetched by URL and held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Cache file name of a downloaded jar, e.g. `paper-1.20.1.jar`.
pub fn cache_file_name(server_type: ServerType, version: &ServerVersion) -> String {
    format!("{server_type}-{version}.jar")
}

/// Last path segment of `url`, if it is a usable file name.
pub fn url_file_name(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?.to_string();
    (!name.is_empty() && is_plain_file_name(&name)).then_some(name)
}

#[derive(Debug)]
pub struct ArtifactManager {
    http: Arc<dyn HttpClient>,
    resolver: ArtifactResolver,
    installer: Arc<dyn ArchiveInstaller>,
    locks: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ArtifactManager {
    pub fn new(
        http: Arc<dyn HttpClient>,
        resolver: ArtifactResolver,
        installer: Arc<dyn ArchiveInstaller>,
    ) -> Self {
        Self {
            http,
            resolver,
            installer,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &ArtifactResolver {
        &self.resolver
    }

    pub fn installer(&self) -> &Arc<dyn ArchiveInstaller> {
        &self.installer
    }

    fn lock_for(&self, key: &Path) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns the runnable jar for `(server_type, version)` inside
    /// `server_dir`, fetching or installing it on first use only.
    pub async fn ensure(
        &self,
        server_type: ServerType,
        version: &ServerVersion,
        server_dir: &Path,
    ) -> Result<PathBuf, ArtifactError> {
        if server_type == ServerType::Mrpack {
            return self.ensure_modpack(version, server_dir).await;
        }

        let dest = server_dir.join(cache_file_name(server_type, version));
        if dest.is_file() {
            debug!(path = %dest.display(), "artifact cached");
            return Ok(dest);
        }

        let lock = self.lock_for(&dest);
        let _guard = lock.lock().await;
        if dest.is_file() {
            return Ok(dest);
        }

        match self.resolver.resolve(server_type, version).await? {
            ResolvedArtifact::Remote { url } => {
                info!(%server_type, %version, %url, "downloading server jar");
                let bytes = self.http.download(&url, &dest).await?;
                info!(path = %dest.display(), bytes, "server jar ready");
                Ok(dest)
            }
            ResolvedArtifact::LocalArchive { path } => Err(ArtifactError::Resolution {
                server_type,
                version: version.to_string(),
                reason: format!("unexpected local archive {}", path.display()),
            }),
        }
    }

    async fn ensure_modpack(
        &self,
        version: &ServerVersion,
        server_dir: &Path,
    ) -> Result<PathBuf, ArtifactError> {
        let lock = self.lock_for(server_dir);
        let _guard = lock.lock().await;

        if let Some(jar) = self.scan(server_dir).await? {
            debug!(path = %jar.display(), "modpack already installed");
            return Ok(jar);
        }

        let archive = match self.resolver.resolve(ServerType::Mrpack, version).await? {
            ResolvedArtifact::LocalArchive { path } => path,
            ResolvedArtifact::Remote { url } => {
                return Err(ArtifactError::Resolution {
                    server_type: ServerType::Mrpack,
                    version: version.to_string(),
                    reason: format!("modpacks are not downloaded directly ({url})"),
                });
            }
        };

        self.installer.install(&archive, server_dir).await?;
        self.scan(server_dir)
            .await?
            .ok_or_else(|| ArtifactError::NoServerJar(server_dir.display().to_string()))
    }

    async fn scan(&self, dir: &Path) -> Result<Option<PathBuf>, ArtifactError> {
        match find_server_jar(dir).await {
            Ok(jar) => Ok(jar),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifactError::Io(format!("{}: {e}", dir.display()))),
        }
    }

    /// Fetches an arbitrary URL into memory; the file name is the URL's
    /// last path segment.
    pub async fn fetch(&self, url: &str) -> Result<FetchedFile, ArtifactError> {
        let file_name =
            url_file_name(url).ok_or_else(|| ArtifactError::InvalidUrl(url.to_string()))?;

        let resp = self.http.get(url).await?;
        if !resp.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status,
            }
            .into());
        }

        Ok(FetchedFile {
            file_name,
            bytes: resp.body,
        })
    }
}
