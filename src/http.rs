use std::{
    ffi::OsString,
    fmt::Debug,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::{fs::File, io::AsyncWriteExt};

use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTP used by the resolver, the downloader and plugin fetches.
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;

    /// Streams the body of `url` into `dest`, returning the byte count.
    /// `dest` only appears once the whole body has been written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// GET `url` and decode a 2xx JSON body.
pub async fn fetch_json<T: DeserializeOwned>(
    http: &dyn HttpClient,
    url: &str,
) -> Result<T, FetchError> {
    let resp = http.get(url).await?;
    if !resp.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: resp.status,
        });
    }

    serde_json::from_slice(&resp.body).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

pub fn part_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("craftkeeper/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn map_err(url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    async fn write_body(
        url: &str,
        mut resp: reqwest::Response,
        part: &Path,
    ) -> Result<u64, FetchError> {
        let io_err = |e: std::io::Error| FetchError::Io {
            path: part.display().to_string(),
            reason: e.to_string(),
        };

        let mut out = File::create(part).await.map_err(io_err)?;
        let mut total: u64 = 0;
        while let Some(chunk) = resp.chunk().await.map_err(|e| Self::map_err(url, e))? {
            total = total.saturating_add(chunk.len() as u64);
            out.write_all(&chunk).await.map_err(io_err)?;
        }
        out.flush().await.map_err(io_err)?;
        out.sync_all().await.map_err(io_err)?;
        Ok(total)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::map_err(url, e))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| Self::map_err(url, e))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::map_err(url, e))?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Io {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let part = part_path(dest);
        match Self::write_body(url, resp, &part).await {
            Ok(total) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| FetchError::Io {
                        path: dest.display().to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(total)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHttp;

    #[derive(Debug, serde::Deserialize)]
    struct Info {
        name: String,
    }

    #[tokio::test]
    async fn fetch_json_decodes_success_bodies() {
        let http = FakeHttp::new().with_json("https://x/info", r#"{"name":"ok"}"#);
        let info: Info = fetch_json(&http, "https://x/info").await.unwrap();
        assert_eq!(info.name, "ok");
    }

    #[tokio::test]
    async fn fetch_json_reports_status_and_decode_errors() {
        let http = FakeHttp::new().with_json("https://x/bad", "not json");

        let err = fetch_json::<Info>(&http, "https://x/missing").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));

        let err = fetch_json::<Info>(&http, "https://x/bad").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/srv/vanilla-1.20.1.jar")),
            PathBuf::from("/srv/vanilla-1.20.1.jar.part")
        );
    }
}
