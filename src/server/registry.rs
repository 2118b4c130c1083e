use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{process, sync::RwLock, time::timeout};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::{LogRecord, ServerType, ServerVersion, Settings},
    download::{ArtifactManager, FetchedFile, ModpackInfo, MrpackInstaller},
    error::{ControlError, StartupError},
    http::HttpClient,
    instance::{InstanceData, InstanceHandle, InstanceStatus},
    manifests::ArtifactResolver,
    store::Store,
    utils::{has_jar_extension, is_plain_file_name},
    wizard::WizardActions,
};

use super::domain::{
    ManagedServer, ServerRecord, ServerSpec, ServerStats, ServerStatusReport, SettingsUpdate,
};

/// Log lines included in a status report.
pub const STATUS_LOG_LINES: usize = 50;

const JAVA_CHECK_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of `upload_modpack`: the version string to create a server with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedModpack {
    pub version: ServerVersion,
    pub info: ModpackInfo,
}

/// Owns every managed server, keyed by port.
#[derive(Debug)]
pub struct ServerRegistry {
    settings: Settings,
    store: Arc<dyn Store>,
    artifacts: Arc<ArtifactManager>,
    servers: RwLock<HashMap<u16, Arc<ManagedServer>>>,
}

impl ServerRegistry {
    pub fn new(settings: Settings, http: Arc<dyn HttpClient>, store: Arc<dyn Store>) -> Self {
        let resolver = ArtifactResolver::new(
            http.clone(),
            settings.endpoints.clone(),
            settings.uploads_dir(),
        );
        let installer = Arc::new(MrpackInstaller::new(
            http.clone(),
            settings.endpoints.fabric.clone(),
        ));
        let artifacts = Arc::new(ArtifactManager::new(http, resolver, installer));

        Self {
            settings,
            store,
            artifacts,
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Checks the runtime, prepares the data directories, loads persisted
    /// servers and starts the ones flagged for auto-start.
    pub async fn bootstrap(
        settings: Settings,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn Store>,
    ) -> Result<Arc<Self>, StartupError> {
        check_java(&settings.java_path).await?;

        for dir in [settings.servers_dir(), settings.uploads_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StartupError::DataDir {
                    path: dir.display().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let registry = Arc::new(Self::new(settings, http, store));
        let auto_start = registry.rehydrate().await?;

        for port in auto_start {
            info!(port, "auto-starting server");
            if let Err(e) = registry.start_server(port).await {
                error!(port, error = %e, "auto-start failed");
            }
        }

        Ok(registry)
    }

    /// Loads persisted records, resetting statuses left over from a previous
    /// run, and returns the ports to auto-start.
    async fn rehydrate(&self) -> Result<Vec<u16>, StartupError> {
        let records = self.store.load_all().await?;
        let mut auto_start = Vec::new();
        let mut servers = self.servers.write().await;

        for mut record in records {
            let port = record.port;
            if record.status != InstanceStatus::Stopped {
                warn!(port, status = %record.status, "resetting stale status");
                record.status = InstanceStatus::Stopped;
                self.store.upsert(&record).await?;
            }
            if record.auto_start {
                auto_start.push(port);
            }

            match self.make_server(record) {
                Ok(server) => {
                    servers.insert(port, server);
                }
                Err(e) => error!(port, error = %e, "skipping unloadable server"),
            }
        }

        info!(count = servers.len(), "servers loaded");
        Ok(auto_start)
    }

    fn make_server(&self, record: ServerRecord) -> Result<Arc<ManagedServer>, ControlError> {
        let data = InstanceData {
            port: record.port,
            root_dir: self.settings.server_dir(record.port),
            java_path: self.settings.java_path.clone(),
        };
        let record = Arc::new(RwLock::new(record));
        let handle = InstanceHandle::new(
            data,
            record.clone(),
            self.store.clone(),
            self.artifacts.clone(),
            self.settings.stop,
        )?;
        Ok(Arc::new(ManagedServer::new(record, handle)))
    }

    async fn get(&self, port: u16) -> Result<Arc<ManagedServer>, ControlError> {
        self.servers
            .read()
            .await
            .get(&port)
            .cloned()
            .ok_or(ControlError::NotFound(port))
    }

    pub async fn create_server(&self, spec: ServerSpec) -> Result<ServerRecord, ControlError> {
        if spec.port == 0 {
            return Err(ControlError::Validation("Port must be non-zero".to_string()));
        }
        match (spec.server_type, &spec.version) {
            (ServerType::Mrpack, ServerVersion::Release(_)) => {
                return Err(ControlError::Validation(
                    "Modpack servers need an uploaded archive (uploaded:<file>)".to_string(),
                ));
            }
            (t, ServerVersion::Uploaded(_)) if t != ServerType::Mrpack => {
                return Err(ControlError::Validation(format!(
                    "Uploaded archives are only valid for mrpack, not {t}"
                )));
            }
            _ => {}
        }

        let mut record = ServerRecord::new(spec.port, spec.server_type, spec.version, spec.memory);
        if let Some(motd) = spec.motd {
            record.motd = motd;
        }
        if let Some(max_players) = spec.max_players {
            record.max_players = max_players;
        }
        record.auto_start = spec.auto_start;

        {
            let mut servers = self.servers.write().await;
            if servers.contains_key(&spec.port) {
                return Err(ControlError::Conflict(format!(
                    "Port {} is already in use",
                    spec.port
                )));
            }
            let server = self.make_server(record.clone())?;
            self.store.upsert(&record).await?;
            servers.insert(spec.port, server);
        }

        info!(port = record.port, server_type = %record.server_type, version = %record.version, "server created");
        self.store
            .append_log(record.port, &LogRecord::info("Server created"))
            .await?;

        if record.auto_start
            && let Err(e) = self.start_server(record.port).await
        {
            warn!(port = record.port, error = %e, "auto-start after create failed");
        }

        Ok(self.get(record.port).await?.snapshot().await)
    }

    pub async fn start_server(&self, port: u16) -> Result<ServerRecord, ControlError> {
        let server = self.get(port).await?;
        server.handle.lock().await.start().await?;
        Ok(server.snapshot().await)
    }

    pub async fn stop_server(&self, port: u16) -> Result<ServerRecord, ControlError> {
        let server = self.get(port).await?;
        server.handle.lock().await.stop().await?;
        Ok(server.snapshot().await)
    }

    pub async fn restart_server(&self, port: u16) -> Result<ServerRecord, ControlError> {
        let server = self.get(port).await?;
        server
            .handle
            .lock()
            .await
            .restart(self.settings.restart_settle)
            .await?;
        Ok(server.snapshot().await)
    }

    pub async fn send_command(&self, port: u16, command: &str) -> Result<(), ControlError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ControlError::Validation("Command is empty".to_string()));
        }
        let server = self.get(port).await?;
        server.handle.lock().await.send_command(command).await?;
        Ok(())
    }

    pub async fn get_status(&self, port: u16) -> Result<ServerStatusReport, ControlError> {
        let server = self.get(port).await?;
        let logs = self
            .store
            .read_logs(port, STATUS_LOG_LINES)
            .await?
            .iter()
            .map(ToString::to_string)
            .collect();
        Ok(ServerStatusReport {
            record: server.snapshot().await,
            logs,
        })
    }

    pub async fn list_servers(&self) -> Vec<ServerRecord> {
        let servers: Vec<Arc<ManagedServer>> =
            self.servers.read().await.values().cloned().collect();

        let mut records = Vec::with_capacity(servers.len());
        for server in servers {
            records.push(server.snapshot().await);
        }
        records.sort_by_key(|r| r.port);
        records
    }

    pub async fn server_stats(&self) -> ServerStats {
        let mut stats = ServerStats::default();
        for record in self.list_servers().await {
            stats.count(record.status);
        }
        stats
    }

    pub async fn update_settings(
        &self,
        port: u16,
        update: SettingsUpdate,
    ) -> Result<ServerRecord, ControlError> {
        let server = self.get(port).await?;
        let mut record = server.record.write().await;

        if let Some(memory) = update.memory {
            record.memory = memory;
        }
        if let Some(motd) = update.motd {
            record.motd = motd;
        }
        if let Some(max_players) = update.max_players {
            record.max_players = max_players;
        }
        if let Some(auto_start) = update.auto_start {
            record.auto_start = auto_start;
        }

        self.store.upsert(&record).await?;
        Ok(record.clone())
    }

    /// Stops the server if needed, then removes its directory, record and logs.
    pub async fn delete_server(&self, port: u16) -> Result<(), ControlError> {
        let server = self.get(port).await?;
        {
            let mut handle = server.handle.lock().await;
            if handle.has_process().await
                && let Err(e) = handle.stop().await
            {
                warn!(port, error = %e, "stop before delete failed");
            }
        }

        self.servers.write().await.remove(&port);

        let dir = self.settings.server_dir(port);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(port, error = %e, "failed to remove server directory"),
        }

        self.store.delete(port).await?;
        self.store.delete_logs(port).await?;
        info!(port, "server deleted");
        Ok(())
    }

    pub async fn read_logs(&self, port: u16, limit: usize) -> Result<Vec<LogRecord>, ControlError> {
        self.get(port).await?;
        Ok(self.store.read_logs(port, limit).await?)
    }

    pub async fn list_versions(&self, server_type: ServerType) -> Result<Vec<String>, ControlError> {
        Ok(self.artifacts.resolver().list_versions(server_type).await?)
    }

    /// Stores an uploaded `.mrpack` under a fresh name and inspects it.
    pub async fn upload_modpack(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<UploadedModpack, ControlError> {
        if !file_name.to_ascii_lowercase().ends_with(".mrpack") {
            return Err(ControlError::Validation(
                "Only .mrpack files are accepted".to_string(),
            ));
        }

        let stored = format!("{}.mrpack", Uuid::new_v4());
        let dir = self.settings.uploads_dir();
        let path = dir.join(&stored);
        write_atomically(&path, bytes).await?;

        match self.artifacts.installer().inspect(&path).await {
            Ok(info) => {
                info!(file = %stored, minecraft = %info.minecraft, "modpack uploaded");
                Ok(UploadedModpack {
                    version: ServerVersion::Uploaded(stored),
                    info,
                })
            }
            Err(e) => {
                _ = tokio::fs::remove_file(&path).await;
                Err(e.into())
            }
        }
    }

    pub async fn plugin_folder(&self, port: u16) -> Result<PathBuf, ControlError> {
        let server = self.get(port).await?;
        let server_type = server.record.read().await.server_type;
        Ok(self
            .settings
            .server_dir(port)
            .join(server_type.plugin_folder()))
    }

    pub async fn list_plugins(&self, port: u16) -> Result<Vec<String>, ControlError> {
        let folder = self.plugin_folder(port).await?;
        let mut entries = match tokio::fs::read_dir(&folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ControlError::io(&folder, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ControlError::io(&folder, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if has_jar_extension(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn install_plugin(
        &self,
        port: u16,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ControlError> {
        validate_plugin_name(file_name)?;
        let path = self.plugin_folder(port).await?.join(file_name);
        write_atomically(&path, bytes).await?;

        info!(port, file = file_name, "plugin installed");
        self.store
            .append_log(port, &LogRecord::info(format!("Installed {file_name}")))
            .await?;
        Ok(path)
    }

    pub async fn remove_plugin(&self, port: u16, file_name: &str) -> Result<(), ControlError> {
        validate_plugin_name(file_name)?;
        let path = self.plugin_folder(port).await?.join(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(port, file = file_name, "plugin removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ControlError::Validation(
                format!("Plugin {file_name} is not installed"),
            )),
            Err(e) => Err(ControlError::io(&path, e)),
        }
    }

    pub async fn fetch_plugin(&self, url: &str) -> Result<FetchedFile, ControlError> {
        Ok(self.artifacts.fetch(url.trim()).await?)
    }

    /// Stops every live process and joins its reader.
    pub async fn shutdown(&self) {
        let servers: Vec<(u16, Arc<ManagedServer>)> = self
            .servers
            .read()
            .await
            .iter()
            .map(|(port, s)| (*port, s.clone()))
            .collect();

        for (port, server) in servers {
            let mut handle = server.handle.lock().await;
            if !handle.has_process().await {
                continue;
            }
            info!(port, "stopping for shutdown");
            if let Err(e) = handle.stop().await {
                error!(port, error = %e, "stop during shutdown failed");
            }
        }
    }
}

async fn check_java(java: &str) -> Result<(), StartupError> {
    let missing = |reason: String| StartupError::JavaMissing {
        java: java.to_string(),
        reason,
    };

    let status = process::Command::new(java)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match timeout(JAVA_CHECK_TIMEOUT, status).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(missing(format!("exited with {status}"))),
        Ok(Err(e)) => Err(missing(e.to_string())),
        Err(_) => Err(missing("timed out".to_string())),
    }
}

fn validate_plugin_name(file_name: &str) -> Result<(), ControlError> {
    if !is_plain_file_name(file_name) || !has_jar_extension(file_name) {
        return Err(ControlError::Validation(format!(
            "{file_name} is not a valid .jar file name"
        )));
    }
    Ok(())
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ControlError> {
    let io = |e: std::io::Error| ControlError::io(path, e);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io)?;
    }
    let tmp = crate::http::part_path(path);
    tokio::fs::write(&tmp, bytes).await.map_err(io)?;
    tokio::fs::rename(&tmp, path).await.map_err(io)
}

#[async_trait]
impl WizardActions for ServerRegistry {
    async fn server_type(&self, port: u16) -> Option<ServerType> {
        let server = self.get(port).await.ok()?;
        let server_type = server.record.read().await.server_type;
        Some(server_type)
    }

    async fn create_server(&self, spec: ServerSpec) -> Result<ServerRecord, ControlError> {
        ServerRegistry::create_server(self, spec).await
    }

    async fn fetch_plugin(&self, url: &str) -> Result<FetchedFile, ControlError> {
        ServerRegistry::fetch_plugin(self, url).await
    }

    async fn install_plugin(
        &self,
        port: u16,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ControlError> {
        ServerRegistry::install_plugin(self, port, file_name, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MemorySpec,
        error::ErrorKind,
        store::JsonStore,
        testing::{FakeHttp, OBEDIENT_SERVER, test_settings, write_script},
        wizard::{Attachment, WizardEngine, WizardKind, WizardReply},
    };

    struct Env {
        dir: tempfile::TempDir,
        settings: Settings,
        http: Arc<FakeHttp>,
        store: Arc<JsonStore>,
    }

    async fn env() -> Env {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path());
        settings.java_path = write_script(&dir.path().join("bin"), "java", OBEDIENT_SERVER)
            .display()
            .to_string();
        let http = Arc::new(FakeHttp::new().with_vanilla("1.20.1", b"jar"));
        let store = Arc::new(JsonStore::open(settings.db_dir()).await.unwrap());
        Env {
            dir,
            settings,
            http,
            store,
        }
    }

    impl Env {
        async fn boot(&self) -> Arc<ServerRegistry> {
            ServerRegistry::bootstrap(self.settings.clone(), self.http.clone(), self.store.clone())
                .await
                .unwrap()
        }
    }

    fn vanilla(port: u16, auto_start: bool) -> ServerSpec {
        ServerSpec {
            port,
            server_type: ServerType::Vanilla,
            version: ServerVersion::Release("1.20.1".to_string()),
            memory: "2G".parse::<MemorySpec>().unwrap(),
            motd: None,
            max_players: None,
            auto_start,
        }
    }

    async fn wait_for(registry: &ServerRegistry, port: u16, want: InstanceStatus) {
        timeout(Duration::from_secs(10), async {
            loop {
                let report = registry.get_status(port).await.unwrap();
                if report.record.status == want {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("port {port} never became {want}"));
    }

    #[tokio::test]
    async fn create_autostart_run_and_stop() {
        let env = env().await;
        let registry = env.boot().await;

        registry.create_server(vanilla(25565, true)).await.unwrap();
        wait_for(&registry, 25565, InstanceStatus::Running).await;

        let jar = env.settings.server_dir(25565).join("vanilla-1.20.1.jar");
        assert!(jar.is_file());

        let record = registry.stop_server(25565).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Stopped);

        let server = registry.get(25565).await.unwrap();
        assert!(!server.handle.lock().await.has_process().await);

        let report = registry.get_status(25565).await.unwrap();
        assert!(report.logs.len() <= STATUS_LOG_LINES);
        assert!(report.logs.iter().any(|l| l.contains("For help")));
    }

    #[tokio::test]
    async fn duplicate_port_is_a_conflict() {
        let env = env().await;
        let registry = env.boot().await;

        registry.create_server(vanilla(25570, false)).await.unwrap();
        let err = registry.create_server(vanilla(25570, false)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(registry.list_servers().await.len(), 1);
    }

    #[tokio::test]
    async fn create_validates_version_shape() {
        let env = env().await;
        let registry = env.boot().await;

        let mut spec = vanilla(25571, false);
        spec.server_type = ServerType::Mrpack;
        let err = registry.create_server(spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut spec = vanilla(25572, false);
        spec.version = ServerVersion::Uploaded("x.mrpack".to_string());
        let err = registry.create_server(spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = registry.create_server(vanilla(0, false)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn unknown_port_is_not_found() {
        let env = env().await;
        let registry = env.boot().await;

        let err = registry.start_server(25999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = registry.get_status(25999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn bootstrap_resets_stale_status_and_autostarts() {
        let env = env().await;
        let mut stale = ServerRecord::new(
            25580,
            ServerType::Vanilla,
            ServerVersion::Release("1.20.1".to_string()),
            MemorySpec::default(),
        );
        stale.status = InstanceStatus::Running;
        env.store.upsert(&stale).await.unwrap();

        let mut auto = stale.clone();
        auto.port = 25581;
        auto.status = InstanceStatus::Stopped;
        auto.auto_start = true;
        env.store.upsert(&auto).await.unwrap();

        let registry = env.boot().await;
        let stale_now = registry.get_status(25580).await.unwrap().record;
        assert_eq!(stale_now.status, InstanceStatus::Stopped);
        assert_eq!(
            env.store.load_all().await.unwrap()[0].status,
            InstanceStatus::Stopped
        );

        wait_for(&registry, 25581, InstanceStatus::Running).await;
        registry.shutdown().await;
        assert_eq!(
            registry.get_status(25581).await.unwrap().record.status,
            InstanceStatus::Stopped
        );
    }

    #[tokio::test]
    async fn missing_java_is_fatal() {
        let env = env().await;
        let mut settings = env.settings.clone();
        settings.java_path = env.dir.path().join("no-such-java").display().to_string();

        let err = ServerRegistry::bootstrap(settings, env.http.clone(), env.store.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::JavaMissing { .. }));
    }

    #[tokio::test]
    async fn settings_update_persists() {
        let env = env().await;
        let registry = env.boot().await;
        registry.create_server(vanilla(25565, false)).await.unwrap();

        let updated = registry
            .update_settings(
                25565,
                SettingsUpdate {
                    memory: Some("4G".parse().unwrap()),
                    motd: Some("hello".to_string()),
                    ..SettingsUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.memory.to_string(), "4G");
        assert_eq!(updated.max_players, 20);

        let stored = env.store.load_all().await.unwrap();
        assert_eq!(stored[0].motd, "hello");
    }

    #[tokio::test]
    async fn delete_removes_everything() {
        let env = env().await;
        let registry = env.boot().await;
        registry.create_server(vanilla(25565, true)).await.unwrap();
        wait_for(&registry, 25565, InstanceStatus::Running).await;

        registry.delete_server(25565).await.unwrap();

        assert!(registry.list_servers().await.is_empty());
        assert!(!env.settings.server_dir(25565).exists());
        assert!(env.store.load_all().await.unwrap().is_empty());
        assert!(env.store.read_logs(25565, 10).await.unwrap().is_empty());
        assert_eq!(registry.server_stats().await, ServerStats::default());
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let env = env().await;
        let registry = env.boot().await;
        registry.create_server(vanilla(25565, false)).await.unwrap();
        registry.create_server(vanilla(25566, false)).await.unwrap();

        let stats = registry.server_stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.stopped, 2);
    }

    #[tokio::test]
    async fn plugins_install_list_remove() {
        let env = env().await;
        let registry = env.boot().await;
        let mut spec = vanilla(25565, false);
        spec.server_type = ServerType::Fabric;
        registry.create_server(spec).await.unwrap();

        let path = registry
            .install_plugin(25565, "lithium.jar", b"lit")
            .await
            .unwrap();
        assert_eq!(path, env.settings.server_dir(25565).join("mods/lithium.jar"));
        assert_eq!(registry.list_plugins(25565).await.unwrap(), vec!["lithium.jar"]);

        let err = registry
            .install_plugin(25565, "../escape.jar", b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = registry
            .install_plugin(25565, "notes.txt", b"x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        registry.remove_plugin(25565, "lithium.jar").await.unwrap();
        assert!(registry.list_plugins(25565).await.unwrap().is_empty());
        assert!(registry.remove_plugin(25565, "lithium.jar").await.is_err());
    }

    #[tokio::test]
    async fn plugin_folder_failures_are_storage_errors() {
        let env = env().await;
        let registry = env.boot().await;
        let mut spec = vanilla(25565, false);
        spec.server_type = ServerType::Fabric;
        registry.create_server(spec).await.unwrap();

        let dir = env.settings.server_dir(25565);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("mods"), b"not a directory").unwrap();

        let err = registry.list_plugins(25565).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        let err = registry
            .install_plugin(25565, "lithium.jar", b"lit")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn creation_wizard_builds_a_running_server() {
        let env = env().await;
        let registry = env.boot().await;
        let wizards = WizardEngine::new(registry.clone(), env.settings.port_range);

        wizards.start_session(7, WizardKind::CreateServer).await.unwrap();
        for input in ["25565", "vanilla", "1.20.1"] {
            assert!(matches!(
                wizards.handle_input(7, input, &[]).await,
                WizardReply::Advanced { .. }
            ));
        }
        let reply = wizards.handle_input(7, "2G", &[]).await;
        assert!(matches!(reply, WizardReply::Completed { success: true, .. }));

        wait_for(&registry, 25565, InstanceStatus::Running).await;
        assert!(registry.get_status(25565).await.unwrap().record.auto_start);

        wizards.start_session(8, WizardKind::CreateServer).await.unwrap();
        assert!(matches!(
            wizards.handle_input(8, "25565", &[]).await,
            WizardReply::Rejected { .. }
        ));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn plugin_wizard_installs_into_server_folder() {
        let env = env().await;
        let http = Arc::new(
            FakeHttp::new()
                .with_vanilla("1.20.1", b"jar")
                .with_bytes("https://cdn.test/lithium.jar", b"lit"),
        );
        let registry =
            ServerRegistry::bootstrap(env.settings.clone(), http, env.store.clone())
                .await
                .unwrap();
        let mut paper = vanilla(25565, false);
        paper.server_type = ServerType::Paper;
        registry.create_server(paper).await.unwrap();
        let mut fabric = vanilla(25566, false);
        fabric.server_type = ServerType::Fabric;
        registry.create_server(fabric).await.unwrap();

        let wizards = WizardEngine::new(registry.clone(), env.settings.port_range);

        wizards
            .start_session(7, WizardKind::InstallPlugin { port: 25565 })
            .await
            .unwrap();
        let attachment = Attachment {
            file_name: "worldedit.jar".to_string(),
            bytes: b"we".to_vec(),
        };
        wizards.handle_input(7, "", &[attachment]).await;
        let reply = wizards.handle_input(7, "yes", &[]).await;
        assert!(matches!(reply, WizardReply::Completed { success: true, .. }));
        let installed = env.settings.server_dir(25565).join("plugins/worldedit.jar");
        assert_eq!(std::fs::read(installed).unwrap(), b"we");

        wizards
            .start_session(7, WizardKind::InstallPlugin { port: 25566 })
            .await
            .unwrap();
        assert!(matches!(
            wizards.handle_input(7, "https://cdn.test/lithium.jar", &[]).await,
            WizardReply::Advanced { .. }
        ));
        let reply = wizards.handle_input(7, "confirm", &[]).await;
        assert!(matches!(reply, WizardReply::Completed { success: true, .. }));
        assert_eq!(registry.list_plugins(25566).await.unwrap(), vec!["lithium.jar"]);

        assert!(
            wizards
                .start_session(7, WizardKind::InstallPlugin { port: 25999 })
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn modpack_upload_returns_uploaded_version() {
        let env = env().await;
        let registry = env.boot().await;

        let pack = env.dir.path().join("src.mrpack");
        crate::download::mrpack::tests::write_pack(
            &pack,
            crate::download::mrpack::tests::FABRIC_INDEX,
            &[],
        );
        let bytes = std::fs::read(&pack).unwrap();

        let uploaded = registry.upload_modpack("My Pack.mrpack", &bytes).await.unwrap();
        assert!(uploaded.version.is_uploaded());
        assert_eq!(uploaded.info.minecraft, "1.20.1");
        let ServerVersion::Uploaded(file) = &uploaded.version else {
            unreachable!()
        };
        assert!(env.settings.uploads_dir().join(file).is_file());

        let err = registry.upload_modpack("pack.zip", &bytes).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = registry.upload_modpack("junk.mrpack", b"nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn version_lists_come_from_the_resolver() {
        let env = env().await;
        let registry = env.boot().await;
        assert_eq!(
            registry.list_versions(ServerType::Vanilla).await.unwrap(),
            vec!["1.20.1"]
        );
    }
}
