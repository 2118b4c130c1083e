use serde::Deserialize;

use crate::{error::FetchError, http::HttpClient, http::fetch_json};

/// Mojang's flat version list.
#[derive(Debug, Clone, Deserialize)]
pub struct VanillaManifest {
    pub versions: Vec<VanillaManifestVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaManifestVersion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Per-version descriptor pointed to by a manifest entry.
#[derive(Debug, Clone, Deserialize)]
pub struct VanillaReleaseManifest {
    pub downloads: VanillaDownloads,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaDownloads {
    pub server: Option<VanillaServerDownload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaServerDownload {
    pub url: String,
}

impl VanillaManifest {
    pub async fn load(http: &dyn HttpClient, url: &str) -> Result<Self, FetchError> {
        fetch_json(http, url).await
    }

    pub fn find(&self, id: &str) -> Option<&VanillaManifestVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Release ids, newest first as published.
    pub fn releases(&self) -> impl Iterator<Item = &str> {
        self.versions
            .iter()
            .filter(|v| v.kind == "release")
            .map(|v| v.id.as_str())
    }
}

impl VanillaReleaseManifest {
    pub async fn load(
        http: &dyn HttpClient,
        entry: &VanillaManifestVersion,
    ) -> Result<Self, FetchError> {
        fetch_json(http, &entry.url).await
    }

    pub fn server_url(&self) -> Option<&str> {
        self.downloads.server.as_ref().map(|s| s.url.as_str())
    }
}
