use serde::Deserialize;

use crate::{error::FetchError, http::HttpClient, http::fetch_json};

#[derive(Debug, Clone, Deserialize)]
pub struct PurpurProject {
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurpurVersion {
    pub builds: PurpurBuilds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurpurBuilds {
    pub latest: Option<String>,
    #[serde(default)]
    pub all: Vec<String>,
}

impl PurpurProject {
    pub async fn load(http: &dyn HttpClient, base: &str) -> Result<Self, FetchError> {
        fetch_json(http, base).await
    }
}

impl PurpurVersion {
    pub async fn load(http: &dyn HttpClient, base: &str, version: &str) -> Result<Self, FetchError> {
        fetch_json(http, &format!("{base}/{version}")).await
    }

    pub fn latest_build(&self) -> Option<&str> {
        self.builds
            .latest
            .as_deref()
            .or_else(|| self.builds.all.last().map(String::as_str))
    }
}

pub fn download_url(base: &str, version: &str, build: &str) -> String {
    format!("{base}/{version}/{build}/download")
}
