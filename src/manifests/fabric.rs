use serde::Deserialize;

use crate::{error::FetchError, http::HttpClient, http::fetch_json};

/// Entry of `/loader`, `/installer` and `/game`; all are listed newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct FabricVersionEntry {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
}

async fn first_version(http: &dyn HttpClient, url: &str) -> Result<Option<String>, FetchError> {
    let list: Vec<FabricVersionEntry> = fetch_json(http, url).await?;
    Ok(list.into_iter().next().map(|v| v.version))
}

pub async fn latest_loader(http: &dyn HttpClient, base: &str) -> Result<Option<String>, FetchError> {
    first_version(http, &format!("{base}/loader")).await
}

pub async fn latest_installer(
    http: &dyn HttpClient,
    base: &str,
) -> Result<Option<String>, FetchError> {
    first_version(http, &format!("{base}/installer")).await
}

pub async fn stable_game_versions(
    http: &dyn HttpClient,
    base: &str,
) -> Result<Vec<String>, FetchError> {
    let list: Vec<FabricVersionEntry> = fetch_json(http, &format!("{base}/game")).await?;
    Ok(list
        .into_iter()
        .filter(|v| v.stable)
        .map(|v| v.version)
        .collect())
}

pub fn server_jar_url(base: &str, game: &str, loader: &str, installer: &str) -> String {
    format!("{base}/loader/{game}/{loader}/{installer}/server/jar")
}
