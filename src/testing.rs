//! Fakes shared by the unit tests.

use std::{
    collections::HashMap,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    config::{Endpoints, Settings, StopPolicy},
    error::FetchError,
    http::{HttpClient, HttpResponse, part_path},
};

#[derive(Debug, Default)]
pub struct FakeHttp {
    routes: HashMap<String, Vec<u8>>,
    hits: Mutex<HashMap<String, usize>>,
    downloads: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, url: &str, body: &str) -> Self {
        self.with_bytes(url, body.as_bytes())
    }

    pub fn with_bytes(mut self, url: &str, body: &[u8]) -> Self {
        self.routes.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Manifest, descriptor and jar for one vanilla release.
    pub fn with_vanilla(self, version: &str, jar: &[u8]) -> Self {
        let descriptor_url = format!("https://meta.test/mojang/{version}.json");
        let manifest = format!(
            r#"{{"versions":[{{"id":"{version}","type":"release","url":"{descriptor_url}"}},{{"id":"24w01a","type":"snapshot","url":"https://meta.test/mojang/24w01a.json"}}]}}"#
        );
        let descriptor = format!(
            r#"{{"downloads":{{"server":{{"url":"{}"}}}}}}"#,
            vanilla_jar_url(version)
        );
        self.with_json("https://meta.test/mojang/version_manifest.json", &manifest)
            .with_json(&descriptor_url, &descriptor)
            .with_bytes(&vanilla_jar_url(version), jar)
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn record(&self, url: &str) {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.record(url);
        Ok(match self.routes.get(url) {
            Some(body) => HttpResponse {
                status: 200,
                body: body.clone(),
            },
            None => HttpResponse {
                status: 404,
                body: Vec::new(),
            },
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        self.record(url);
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let body = self.routes.get(url).ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let part = part_path(dest);
        std::fs::write(&part, body).unwrap();
        std::fs::rename(&part, dest).unwrap();
        Ok(body.len() as u64)
    }
}

pub fn vanilla_jar_url(version: &str) -> String {
    format!("https://files.test/vanilla/{version}/server.jar")
}

/// Settings rooted in `root` with fast stop escalation and fake endpoints.
pub fn test_settings(root: &Path) -> Settings {
    Settings {
        data_dir: root.join("data"),
        java_path: "java".to_string(),
        stop: StopPolicy {
            graceful_polls: 10,
            poll_interval: Duration::from_millis(50),
            term_grace: Duration::from_millis(200),
        },
        restart_settle: Duration::from_millis(50),
        endpoints: Endpoints {
            mojang_manifest: "https://meta.test/mojang/version_manifest.json".to_string(),
            papermc: "https://meta.test/paper".to_string(),
            purpur: "https://meta.test/purpur".to_string(),
            fabric: "https://meta.test/fabric".to_string(),
        },
        ..Settings::default()
    }
}

/// Boots, prints the vanilla "Done" line and exits on `stop`.
pub const OBEDIENT_SERVER: &str = r#"#!/bin/sh
echo "[12:00:00] [Server thread/INFO]: Starting minecraft server with $*"
echo "[12:00:01] [Server thread/INFO]: Done (0.501s)! For help, type \"help\""
while read line; do
  echo "[12:00:02] [Server thread/INFO]: Received $line"
  if [ "$line" = "stop" ]; then
    echo "[12:00:03] [Server thread/INFO]: Stopping server"
    exit 0
  fi
done
"#;

/// Boots but ignores both the stop directive and SIGTERM.
pub const STUBBORN_SERVER: &str = r#"#!/bin/sh
trap '' TERM
echo "[12:00:01] [Server thread/INFO]: Done (0.501s)! For help, type \"help\""
while true; do
  read line || sleep 1
done
"#;

/// Dies before it ever finishes booting.
pub const CRASHING_SERVER: &str = r#"#!/bin/sh
echo "[12:00:00] [Server thread/INFO]: Starting minecraft server"
echo "[12:00:00] [main/ERROR]: Exception in server tick loop"
exit 1
"#;

/// Reports a boot failure and keeps running.
pub const FAILING_BOOT_SERVER: &str = r#"#!/bin/sh
echo "[12:00:00] [Server thread/ERROR]: Failed to start the minecraft server"
while read line; do
  if [ "$line" = "stop" ]; then exit 0; fi
done
"#;

/// Reports a boot failure and exits, like a JVM that gave up.
pub const EXITING_BOOT_FAILURE_SERVER: &str = r#"#!/bin/sh
echo "[12:00:00] [Server thread/ERROR]: Failed to start the minecraft server"
exit 1
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
