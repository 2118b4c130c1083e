use std::{path::Path, process::Stdio, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter},
    process::{self, Child, ChildStdin},
    sync::{Mutex, RwLock, broadcast, mpsc},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::{
        LogRecord, ServerType, StopPolicy, StreamLine, StreamSource,
        stream::InstanceEvent,
    },
    download::ArtifactManager,
    error::{HandleError, ServerError},
    parser::{InternalEvent, parse_event},
    server::ServerRecord,
    store::Store,
};

use super::{InstanceData, InstanceStatus};

const STOP_DIRECTIVE: &str = "stop";
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared by the handle and its reader task: the only path through which
/// status changes and log records are published.
#[derive(Debug, Clone)]
struct Reporter {
    port: u16,
    record: Arc<RwLock<ServerRecord>>,
    store: Arc<dyn Store>,
    events_tx: broadcast::Sender<InstanceEvent>,
}

impl Reporter {
    async fn log(&self, record: LogRecord) {
        if let Err(e) = self.store.append_log(self.port, &record).await {
            warn!(port = self.port, error = %e, "failed to persist log record");
        }
        _ = self.events_tx.send(InstanceEvent::log(self.port, record));
    }

    /// Applies `to` if the lifecycle graph allows it and persists the
    /// record before returning.
    async fn transition(&self, to: InstanceStatus) -> Result<InstanceStatus, ServerError> {
        let mut guard = self.record.write().await;
        let from = guard.status;
        if !from.can_transition(to) {
            return Err(ServerError::InvalidTransition { from, to });
        }

        guard.status = to;
        if to == InstanceStatus::Running {
            guard.last_started = Some(Utc::now());
        }
        if let Err(e) = self.store.upsert(&guard).await {
            warn!(port = self.port, error = %e, "failed to persist status");
        }
        drop(guard);

        info!(port = self.port, %from, %to, "status changed");
        self.log(LogRecord::info(format!("Status: {from} -> {to}")))
            .await;
        _ = self
            .events_tx
            .send(InstanceEvent::state_change(self.port, from, to));
        Ok(from)
    }

    async fn status(&self) -> InstanceStatus {
        self.record.read().await.status
    }
}

/// Supervises the process of one server: spawn, output reader, stdin pump
/// and the stop escalation.
#[derive(Debug)]
pub struct InstanceHandle {
    pub data: InstanceData,
    reporter: Reporter,
    artifacts: Arc<ArtifactManager>,
    stop_policy: StopPolicy,
    stdin_tx: Option<mpsc::Sender<String>>,
    child: Arc<Mutex<Option<Child>>>,
    pgid: Option<i32>,
    shutdown: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl InstanceHandle {
    pub fn new(
        data: InstanceData,
        record: Arc<RwLock<ServerRecord>>,
        store: Arc<dyn Store>,
        artifacts: Arc<ArtifactManager>,
        stop_policy: StopPolicy,
    ) -> Result<Self, HandleError> {
        if data.root_dir.exists() && !data.root_dir.is_dir() {
            return Err(HandleError::InvalidDirectory(
                data.root_dir.display().to_string(),
            ));
        }

        let reporter = Reporter {
            port: data.port,
            record,
            store,
            events_tx: broadcast::Sender::new(2048),
        };

        Ok(Self {
            data,
            reporter,
            artifacts,
            stop_policy,
            stdin_tx: None,
            child: Arc::new(Mutex::new(None)),
            pgid: None,
            shutdown: CancellationToken::new(),
            reader: None,
        })
    }

    pub async fn status(&self) -> InstanceStatus {
        self.reporter.status().await
    }

    /// Whether a process handle is currently held.
    pub async fn has_process(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// True when a handle is held but its process is already gone.
    async fn process_exited(&self) -> bool {
        let mut guard = self.child.lock().await;
        guard
            .as_mut()
            .is_some_and(|c| matches!(c.try_wait(), Ok(Some(_))))
    }

    pub fn subscribe(&self) -> BroadcastStream<InstanceEvent> {
        BroadcastStream::new(self.reporter.events_tx.subscribe())
    }

    pub async fn send_command<S: Into<String>>(&self, cmd: S) -> Result<(), ServerError> {
        if self.status().await != InstanceStatus::Running {
            return Err(ServerError::NotRunning);
        }
        self.write_stdin(cmd.into()).await
    }

    async fn write_stdin(&self, mut command: String) -> Result<(), ServerError> {
        if !command.ends_with('\n') {
            command.push('\n');
        }

        let tx = self.stdin_tx.as_ref().ok_or(ServerError::NoStdinPipe)?;
        tx.send(command)
            .await
            .map_err(|_| ServerError::StdinWriteFailed)
    }

    pub async fn start(&mut self) -> Result<(), ServerError> {
        self.validate_start_parameters().await?;

        let record = self.reporter.record.read().await.clone();
        self.reporter
            .log(LogRecord::info(format!(
                "Preparing {} {} in {}",
                record.server_type,
                record.version,
                self.data.root_dir.display()
            )))
            .await;

        tokio::fs::create_dir_all(&self.data.root_dir)
            .await
            .map_err(|e| ServerError::FileIO(e.to_string()))?;

        let jar = match self
            .artifacts
            .ensure(record.server_type, &record.version, &self.data.root_dir)
            .await
        {
            Ok(jar) => jar,
            Err(e) => {
                error!(port = self.data.port, error = %e, "artifact unavailable");
                self.reporter
                    .log(LogRecord::error(format!("Failed to obtain server jar: {e}")))
                    .await;
                return Err(e.into());
            }
        };

        prepare_workdir(&self.data.root_dir, &record)
            .await
            .map_err(|e| ServerError::FileIO(e.to_string()))?;

        let command = self.build_start_command(&record, &jar);
        self.reporter.transition(InstanceStatus::Starting).await?;

        let child = match self.spawn_child_process(command) {
            Ok(child) => child,
            Err(e) => {
                error!(port = self.data.port, error = %e, "spawn failed");
                self.reporter
                    .log(LogRecord::error(format!("Failed to launch: {e}")))
                    .await;
                _ = self.reporter.transition(InstanceStatus::Error).await;
                return Err(e);
            }
        };

        self.setup_stream_pumps(child).await?;
        info!(port = self.data.port, jar = %jar.display(), "server process spawned");
        self.reporter
            .log(LogRecord::info(format!("Server starting on port {}", self.data.port)))
            .await;

        Ok(())
    }

    async fn validate_start_parameters(&mut self) -> Result<(), ServerError> {
        if self.process_exited().await {
            self.release_process().await;
        }
        if self.has_process().await {
            return Err(ServerError::AlreadyRunning);
        }

        let from = self.status().await;
        if !from.can_transition(InstanceStatus::Starting) {
            return Err(ServerError::InvalidTransition {
                from,
                to: InstanceStatus::Starting,
            });
        }

        Ok(())
    }

    fn build_start_command(&self, record: &ServerRecord, jar: &Path) -> process::Command {
        let jar_arg = jar.file_name().map(Path::new).unwrap_or(jar);

        let mut command = process::Command::new(&self.data.java_path);
        command
            .arg(record.memory.heap_flag())
            .arg("-jar")
            .arg(jar_arg)
            .arg("nogui")
            .current_dir(&self.data.root_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        command.process_group(0);
        command
    }

    fn spawn_child_process(&self, mut command: process::Command) -> Result<Child, ServerError> {
        command
            .spawn()
            .map_err(|e| ServerError::CommandFailed(e.to_string()))
    }

    async fn setup_stream_pumps(&mut self, mut child: Child) -> Result<(), ServerError> {
        let stdout = child.stdout.take().ok_or(ServerError::NoStdoutPipe)?;
        let stderr = child.stderr.take().ok_or(ServerError::NoStderrPipe)?;
        let stdin = child.stdin.take().ok_or(ServerError::NoStdinPipe)?;

        self.pgid = child.id().and_then(|pid| i32::try_from(pid).ok());
        *self.child.lock().await = Some(child);

        self.shutdown = CancellationToken::new();

        let (stdin_tx, stdin_rx) = mpsc::channel(1024);
        self.stdin_tx = Some(stdin_tx);
        tokio::spawn(pump_stdin(stdin, stdin_rx, self.shutdown.clone()));

        let (line_tx, line_rx) = mpsc::channel(1024);
        tokio::spawn(pump_lines(stdout, StreamSource::Stdout, line_tx.clone()));
        tokio::spawn(pump_lines(stderr, StreamSource::Stderr, line_tx));

        let server_type = self.reporter.record.read().await.server_type;
        self.reader = Some(tokio::spawn(read_output(
            self.reporter.clone(),
            server_type,
            line_rx,
            self.child.clone(),
            self.shutdown.clone(),
        )));

        Ok(())
    }

    /// Graceful directive, then SIGTERM to the process group, then SIGKILL.
    /// Always leaves the server `stopped` with no process attached.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        if !self.has_process().await {
            return Err(ServerError::NotRunning);
        }

        self.reporter.transition(InstanceStatus::Stopping).await?;
        self.reporter
            .log(LogRecord::info("Stopping server"))
            .await;

        if let Err(e) = self.write_stdin(STOP_DIRECTIVE.to_string()).await {
            warn!(port = self.data.port, error = %e, "could not deliver stop directive");
        }

        let policy = self.stop_policy;
        if !self.wait_exit(policy.graceful_polls, policy.poll_interval).await {
            warn!(port = self.data.port, "graceful stop timed out, sending SIGTERM");
            self.reporter
                .log(LogRecord::warn("Server did not stop in time, terminating"))
                .await;
            self.signal(libc::SIGTERM);

            let interval_ms = policy.poll_interval.as_millis().max(1);
            let polls = (policy.term_grace.as_millis() / interval_ms).max(1);
            let polls = u32::try_from(polls).unwrap_or(u32::MAX);
            if !self.wait_exit(polls, policy.poll_interval).await {
                warn!(port = self.data.port, "SIGTERM ignored, killing");
                self.reporter
                    .log(LogRecord::warn("Server ignored termination, killing"))
                    .await;
                self.signal(libc::SIGKILL);
            }
        }

        self.release_process().await;
        self.reporter.transition(InstanceStatus::Stopped).await?;
        self.reporter.log(LogRecord::info("Server stopped")).await;
        Ok(())
    }

    pub async fn restart(&mut self, settle: Duration) -> Result<(), ServerError> {
        if let Err(e) = self.stop().await {
            warn!(port = self.data.port, error = %e, "restart: stop failed, starting anyway");
            self.reporter
                .log(LogRecord::warn(format!("Restart: stop failed: {e}")))
                .await;
        }
        sleep(settle).await;
        self.start().await
    }

    /// Polls for process exit; true once no live process remains.
    async fn wait_exit(&self, polls: u32, interval: Duration) -> bool {
        for _ in 0..polls {
            {
                let mut guard = self.child.lock().await;
                match guard.as_mut() {
                    None => return true,
                    Some(child) => match child.try_wait() {
                        Ok(Some(_)) => return true,
                        Ok(None) => {}
                        Err(e) => {
                            warn!(port = self.data.port, error = %e, "try_wait failed");
                            return false;
                        }
                    },
                }
            }
            sleep(interval).await;
        }
        false
    }

    fn signal(&self, sig: i32) {
        if let Some(pgid) = self.pgid {
            debug!(port = self.data.port, pgid, sig, "signalling process group");
            if let Err(e) = signal_group(pgid, sig) {
                debug!(port = self.data.port, pgid, sig, error = %e, "kill failed");
            }
        }
    }

    /// Reaps the child, closes stdin and joins the reader.
    async fn release_process(&mut self) {
        let taken = self.child.lock().await.take();
        if let Some(mut child) = taken {
            if !matches!(child.try_wait(), Ok(Some(_))) {
                _ = child.kill().await;
            }
            match child.wait().await {
                Ok(status) => debug!(port = self.data.port, %status, "process reaped"),
                Err(e) => warn!(port = self.data.port, error = %e, "wait failed"),
            }
        }

        self.shutdown.cancel();
        self.stdin_tx = None;
        self.pgid = None;

        if let Some(mut reader) = self.reader.take()
            && timeout(READER_JOIN_TIMEOUT, &mut reader).await.is_err()
        {
            warn!(port = self.data.port, "output reader did not finish, aborting");
            reader.abort();
        }
    }
}

fn signal_group(pgid: i32, sig: i32) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(-pgid, sig) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

async fn pump_lines<R>(reader: R, source: StreamSource, tx: mpsc::Sender<StreamLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = StreamLine::new(String::from_utf8_lossy(&buf), source);
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn pump_stdin(
    stdin: ChildStdin,
    mut stdin_rx: mpsc::Receiver<String>,
    shutdown: CancellationToken,
) {
    let mut writer = BufWriter::new(stdin);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                break;
            }
            maybe_cmd = stdin_rx.recv() => {
                let Some(cmd) = maybe_cmd else { break };
                if writer.write_all(cmd.as_bytes()).await.is_err()
                    || writer.flush().await.is_err()
                {
                    break;
                }
            }
        }
    }
}

/// Every non-blank line is recorded before any transition it triggers.
/// When both streams close outside of a stop the process is reaped and the
/// server is left in `error`.
async fn read_output(
    reporter: Reporter,
    server_type: ServerType,
    mut lines: mpsc::Receiver<StreamLine>,
    child: Arc<Mutex<Option<Child>>>,
    shutdown: CancellationToken,
) {
    while let Some(line) = lines.recv().await {
        if line.is_blank() {
            continue;
        }
        reporter.log(LogRecord::from_line(&line)).await;

        match parse_event(server_type, line.msg()) {
            Some(InternalEvent::ServerStarted) => {
                if reporter.status().await == InstanceStatus::Starting
                    && reporter.transition(InstanceStatus::Running).await.is_ok()
                {
                    reporter
                        .log(LogRecord::info("Server started successfully"))
                        .await;
                }
            }
            Some(InternalEvent::BootFailed) => {
                if reporter.transition(InstanceStatus::Error).await.is_ok() {
                    error!(port = reporter.port, "server reported a boot failure");
                    reporter.log(LogRecord::error("Server failed to start")).await;
                }
            }
            None => {}
        }
    }

    // A stop in progress owns the teardown.
    let status = reporter.status().await;
    if status == InstanceStatus::Stopping {
        return;
    }

    let taken = child.lock().await.take();
    let exit = match taken {
        Some(mut c) => {
            if matches!(c.try_wait(), Ok(None)) {
                _ = c.start_kill();
            }
            c.wait().await.map(|s| s.to_string()).ok()
        }
        None => None,
    };
    shutdown.cancel();
    let detail = exit.unwrap_or_else(|| "unknown status".to_string());

    if status == InstanceStatus::Error {
        debug!(port = reporter.port, exit = %detail, "failed server exited");
        reporter
            .log(LogRecord::info(format!("Server process exited ({detail})")))
            .await;
    } else if reporter.transition(InstanceStatus::Error).await.is_ok() {
        error!(port = reporter.port, exit = %detail, "server exited unexpectedly");
        reporter
            .log(LogRecord::error(format!("Server exited unexpectedly ({detail})")))
            .await;
    }
}

/// Accepts the EULA and pins the port, MOTD and player cap in
/// `server.properties`. Proxies keep their own config.
async fn prepare_workdir(dir: &Path, record: &ServerRecord) -> std::io::Result<()> {
    if record.server_type == ServerType::Velocity {
        return Ok(());
    }

    let eula = dir.join("eula.txt");
    if !eula.exists() {
        tokio::fs::write(&eula, b"#Generated by craftkeeper\neula=true\n").await?;
    }

    let path = dir.join("server.properties");
    let existing = match tokio::fs::read_to_string(&path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let updated = apply_properties(
        &existing,
        &[
            ("server-port", record.port.to_string()),
            ("motd", record.motd.clone()),
            ("max-players", record.max_players.to_string()),
        ],
    );
    tokio::fs::write(&path, updated).await
}

fn apply_properties(existing: &str, pairs: &[(&str, String)]) -> String {
    let mut seen = vec![false; pairs.len()];
    let mut out = String::new();

    for line in existing.lines() {
        let key = line.split_once('=').map(|(k, _)| k.trim());
        match key.and_then(|k| pairs.iter().position(|(p, _)| *p == k)) {
            Some(i) if !line.trim_start().starts_with('#') => {
                out.push_str(&format!("{}={}\n", pairs[i].0, pairs[i].1));
                seen[i] = true;
            }
            _ => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    for (i, (key, value)) in pairs.iter().enumerate() {
        if !seen[i] {
            out.push_str(&format!("{key}={value}\n"));
        }
    }
    out
}
