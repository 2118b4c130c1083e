//! Turns a `(server type, version)` pair into something installable.

use std::{path::PathBuf, sync::Arc};

use tracing::debug;

use crate::{
    config::{Endpoints, ServerType, ServerVersion},
    error::{ArtifactError, FetchError},
    http::HttpClient,
};

pub mod fabric;
pub mod papermc;
pub mod purpur;
pub mod vanilla;

use vanilla::{VanillaManifest, VanillaReleaseManifest};

const VERSION_LIST_LIMIT: usize = 20;

/// Placeholder offered for modpacks; the real version comes from an upload.
pub const UPLOADED_MODPACK_PLACEHOLDER: &str = "uploaded:mrpack";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedArtifact {
    Remote { url: String },
    LocalArchive { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    http: Arc<dyn HttpClient>,
    endpoints: Endpoints,
    uploads_dir: PathBuf,
}

impl ArtifactResolver {
    pub fn new(http: Arc<dyn HttpClient>, endpoints: Endpoints, uploads_dir: PathBuf) -> Self {
        Self {
            http,
            endpoints,
            uploads_dir,
        }
    }

    pub async fn resolve(
        &self,
        server_type: ServerType,
        version: &ServerVersion,
    ) -> Result<ResolvedArtifact, ArtifactError> {
        let fail = |reason: String| ArtifactError::Resolution {
            server_type,
            version: version.to_string(),
            reason,
        };
        let upstream = |e: FetchError| fail(e.to_string());

        let id = match (server_type, version) {
            (ServerType::Mrpack, ServerVersion::Uploaded(file)) => {
                let path = self.uploads_dir.join(file);
                return match tokio::fs::metadata(&path).await {
                    Ok(meta) if meta.is_file() => Ok(ResolvedArtifact::LocalArchive { path }),
                    _ => Err(ArtifactError::UploadMissing(path.display().to_string())),
                };
            }
            (ServerType::Mrpack, ServerVersion::Release(_)) => {
                return Err(fail(
                    "modpacks must reference an uploaded archive (uploaded:<file>)".to_string(),
                ));
            }
            (_, ServerVersion::Uploaded(_)) => {
                return Err(fail("uploaded archives are only valid for mrpack".to_string()));
            }
            (_, ServerVersion::Release(id)) => id.as_str(),
        };

        let url = match server_type {
            ServerType::Vanilla => {
                let manifest = VanillaManifest::load(self.http.as_ref(), &self.endpoints.mojang_manifest)
                    .await
                    .map_err(upstream)?;
                let entry = manifest
                    .find(id)
                    .ok_or_else(|| fail("version not found".to_string()))?;
                let release = VanillaReleaseManifest::load(self.http.as_ref(), entry)
                    .await
                    .map_err(upstream)?;
                release
                    .server_url()
                    .ok_or_else(|| fail("version has no server download".to_string()))?
                    .to_string()
            }
            ServerType::Paper | ServerType::Velocity => {
                let project = server_type.as_str();
                let builds =
                    papermc::PaperVersion::load(self.http.as_ref(), &self.endpoints.papermc, project, id)
                        .await
                        .map_err(upstream)?;
                let build = builds
                    .latest_build()
                    .ok_or_else(|| fail("no builds published".to_string()))?;
                papermc::download_url(&self.endpoints.papermc, project, id, build)
            }
            ServerType::Purpur => {
                let builds = purpur::PurpurVersion::load(self.http.as_ref(), &self.endpoints.purpur, id)
                    .await
                    .map_err(upstream)?;
                let build = builds
                    .latest_build()
                    .ok_or_else(|| fail("no builds published".to_string()))?;
                purpur::download_url(&self.endpoints.purpur, id, build)
            }
            ServerType::Fabric => {
                let base = &self.endpoints.fabric;
                let loader = fabric::latest_loader(self.http.as_ref(), base)
                    .await
                    .map_err(upstream)?
                    .ok_or_else(|| fail("no fabric loader versions".to_string()))?;
                let installer = fabric::latest_installer(self.http.as_ref(), base)
                    .await
                    .map_err(upstream)?
                    .ok_or_else(|| fail("no fabric installer versions".to_string()))?;
                fabric::server_jar_url(base, id, &loader, &installer)
            }
            ServerType::Mrpack => {
                return Err(fail("modpacks are installed from archives".to_string()));
            }
        };

        debug!(%server_type, version = %version, %url, "resolved artifact");
        Ok(ResolvedArtifact::Remote { url })
    }

    /// Up to twenty recent versions published for `server_type`.
    pub async fn list_versions(&self, server_type: ServerType) -> Result<Vec<String>, ArtifactError> {
        let upstream = |e: FetchError| ArtifactError::Resolution {
            server_type,
            version: "*".to_string(),
            reason: e.to_string(),
        };
        let newest_first = |mut versions: Vec<String>| {
            versions.reverse();
            versions.truncate(VERSION_LIST_LIMIT);
            versions
        };

        let versions = match server_type {
            ServerType::Vanilla => {
                let manifest = VanillaManifest::load(self.http.as_ref(), &self.endpoints.mojang_manifest)
                    .await
                    .map_err(upstream)?;
                manifest
                    .releases()
                    .take(VERSION_LIST_LIMIT)
                    .map(str::to_string)
                    .collect()
            }
            ServerType::Paper | ServerType::Velocity => {
                let project =
                    papermc::PaperProject::load(self.http.as_ref(), &self.endpoints.papermc, server_type.as_str())
                        .await
                        .map_err(upstream)?;
                newest_first(project.versions)
            }
            ServerType::Purpur => {
                let project = purpur::PurpurProject::load(self.http.as_ref(), &self.endpoints.purpur)
                    .await
                    .map_err(upstream)?;
                newest_first(project.versions)
            }
            ServerType::Fabric => {
                let mut versions = fabric::stable_game_versions(self.http.as_ref(), &self.endpoints.fabric)
                    .await
                    .map_err(upstream)?;
                versions.truncate(VERSION_LIST_LIMIT);
                versions
            }
            ServerType::Mrpack => vec![UPLOADED_MODPACK_PLACEHOLDER.to_string()],
        };

        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHttp, test_settings};

    fn resolver(http: FakeHttp, uploads: PathBuf) -> ArtifactResolver {
        let settings = test_settings(std::path::Path::new("/unused"));
        ArtifactResolver::new(Arc::new(http), settings.endpoints, uploads)
    }

    fn release(v: &str) -> ServerVersion {
        ServerVersion::Release(v.to_string())
    }

    #[tokio::test]
    async fn vanilla_goes_through_manifest_then_descriptor() {
        let http = FakeHttp::new().with_vanilla("1.20.1", b"jar");
        let r = resolver(http, PathBuf::from("/uploads"));

        let got = r.resolve(ServerType::Vanilla, &release("1.20.1")).await.unwrap();
        assert_eq!(
            got,
            ResolvedArtifact::Remote {
                url: crate::testing::vanilla_jar_url("1.20.1")
            }
        );

        let err = r.resolve(ServerType::Vanilla, &release("9.9.9")).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Resolution { .. }));
    }

    #[tokio::test]
    async fn paper_picks_last_build() {
        let http = FakeHttp::new().with_json(
            "https://meta.test/paper/paper/versions/1.20.1",
            r#"{"builds":[1,2,196]}"#,
        );
        let r = resolver(http, PathBuf::from("/uploads"));

        let got = r.resolve(ServerType::Paper, &release("1.20.1")).await.unwrap();
        assert_eq!(
            got,
            ResolvedArtifact::Remote {
                url: "https://meta.test/paper/paper/versions/1.20.1/builds/196/downloads/paper-1.20.1-196.jar"
                    .to_string()
            }
        );
    }

    #[tokio::test]
    async fn velocity_uses_its_own_project() {
        let http = FakeHttp::new().with_json(
            "https://meta.test/paper/velocity/versions/3.3.0-SNAPSHOT",
            r#"{"builds":[400,401]}"#,
        );
        let r = resolver(http, PathBuf::from("/uploads"));

        let got = r
            .resolve(ServerType::Velocity, &release("3.3.0-SNAPSHOT"))
            .await
            .unwrap();
        assert_eq!(
            got,
            ResolvedArtifact::Remote {
                url: "https://meta.test/paper/velocity/versions/3.3.0-SNAPSHOT/builds/401/downloads/velocity-3.3.0-SNAPSHOT-401.jar"
                    .to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_build_list_is_a_resolution_error() {
        let http = FakeHttp::new().with_json(
            "https://meta.test/paper/paper/versions/1.20.1",
            r#"{"builds":[]}"#,
        );
        let r = resolver(http, PathBuf::from("/uploads"));
        let err = r.resolve(ServerType::Paper, &release("1.20.1")).await.unwrap_err();
        assert!(err.to_string().contains("no builds published"));
    }

    #[tokio::test]
    async fn purpur_uses_declared_latest() {
        let http = FakeHttp::new().with_json(
            "https://meta.test/purpur/1.20.1",
            r#"{"builds":{"latest":"2062","all":["2061","2062"]}}"#,
        );
        let r = resolver(http, PathBuf::from("/uploads"));
        let got = r.resolve(ServerType::Purpur, &release("1.20.1")).await.unwrap();
        assert_eq!(
            got,
            ResolvedArtifact::Remote {
                url: "https://meta.test/purpur/1.20.1/2062/download".to_string()
            }
        );
    }

    #[tokio::test]
    async fn fabric_composes_loader_and_installer() {
        let http = FakeHttp::new()
            .with_json(
                "https://meta.test/fabric/loader",
                r#"[{"version":"0.15.11","stable":true},{"version":"0.15.10","stable":true}]"#,
            )
            .with_json(
                "https://meta.test/fabric/installer",
                r#"[{"version":"1.0.1","stable":true}]"#,
            );
        let r = resolver(http, PathBuf::from("/uploads"));
        let got = r.resolve(ServerType::Fabric, &release("1.20.1")).await.unwrap();
        assert_eq!(
            got,
            ResolvedArtifact::Remote {
                url: "https://meta.test/fabric/loader/1.20.1/0.15.11/1.0.1/server/jar".to_string()
            }
        );
    }

    #[tokio::test]
    async fn uploaded_modpack_short_circuits_to_disk() {
        let uploads = tempfile::tempdir().unwrap();
        std::fs::write(uploads.path().join("pack.mrpack"), b"zip").unwrap();
        let http = FakeHttp::new();
        let r = resolver(http, uploads.path().to_path_buf());

        let got = r
            .resolve(ServerType::Mrpack, &ServerVersion::Uploaded("pack.mrpack".to_string()))
            .await
            .unwrap();
        assert_eq!(
            got,
            ResolvedArtifact::LocalArchive {
                path: uploads.path().join("pack.mrpack")
            }
        );

        let err = r
            .resolve(ServerType::Mrpack, &ServerVersion::Uploaded("gone.mrpack".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::UploadMissing(_)));

        let err = r.resolve(ServerType::Mrpack, &release("1.20.1")).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Resolution { .. }));
    }

    #[tokio::test]
    async fn version_lists_are_capped_and_newest_first() {
        let versions: Vec<String> = (0..30).map(|i| format!("\"1.{i}\"")).collect();
        let http = FakeHttp::new().with_json(
            "https://meta.test/paper/paper",
            &format!(r#"{{"versions":[{}]}}"#, versions.join(",")),
        );
        let r = resolver(http, PathBuf::from("/uploads"));

        let list = r.list_versions(ServerType::Paper).await.unwrap();
        assert_eq!(list.len(), 20);
        assert_eq!(list[0], "1.29");

        let list = r.list_versions(ServerType::Mrpack).await.unwrap();
        assert_eq!(list, vec![UPLOADED_MODPACK_PLACEHOLDER.to_string()]);
    }
}
