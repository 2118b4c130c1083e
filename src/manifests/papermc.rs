use serde::Deserialize;

use crate::{error::FetchError, http::HttpClient, http::fetch_json};

/// `GET /projects/{project}`
#[derive(Debug, Clone, Deserialize)]
pub struct PaperProject {
    pub versions: Vec<String>,
}

/// `GET /projects/{project}/versions/{version}`
#[derive(Debug, Clone, Deserialize)]
pub struct PaperVersion {
    pub builds: Vec<u32>,
}

impl PaperProject {
    pub async fn load(http: &dyn HttpClient, base: &str, project: &str) -> Result<Self, FetchError> {
        fetch_json(http, &format!("{base}/{project}")).await
    }
}

impl PaperVersion {
    pub async fn load(
        http: &dyn HttpClient,
        base: &str,
        project: &str,
        version: &str,
    ) -> Result<Self, FetchError> {
        fetch_json(http, &format!("{base}/{project}/versions/{version}")).await
    }

    /// Last entry of the published list; the API orders builds oldest first.
    pub fn latest_build(&self) -> Option<u32> {
        self.builds.last().copied()
    }
}

pub fn download_url(base: &str, project: &str, version: &str, build: u32) -> String {
    format!(
        "{base}/{project}/versions/{version}/builds/{build}/downloads/{project}-{version}-{build}.jar"
    )
}
