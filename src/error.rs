use thiserror::Error;

use crate::{config::ServerType, instance::InstanceStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Unknown server type: {0}")]
    UnknownServerType(String),

    #[error("Invalid memory spec: {0} (expected e.g. 4G or 2048M)")]
    InvalidMemory(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    #[error("Failed to resolve {server_type} {version}: {reason}")]
    Resolution {
        server_type: ServerType,
        version: String,
        reason: String,
    },

    #[error("Download failed: {0}")]
    Download(#[from] FetchError),

    #[error("Uploaded modpack not found: {0}")]
    UploadMissing(String),

    #[error("Invalid modpack archive: {0}")]
    InvalidArchive(String),

    #[error("No server jar found in {0}")]
    NoServerJar(String),

    #[error("Invalid download URL: {0}")]
    InvalidUrl(String),

    #[error("Filesystem error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store I/O failed on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Corrupt record at {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum HandleError {
    #[error("Invalid server root directory: {0}")]
    InvalidDirectory(String),
}

#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Server is not running")]
    NotRunning,

    #[error("Failed to run java command: {0}")]
    CommandFailed(String),

    #[error("Failed to access child stdout pipe")]
    NoStdoutPipe,

    #[error("Failed to access child stdin pipe")]
    NoStdinPipe,

    #[error("Failed to access child stderr pipe")]
    NoStderrPipe,

    #[error("Failed to write to stdin")]
    StdinWriteFailed,

    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("Artifact unavailable: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("File operation failed: {0}")]
    FileIO(String),
}

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("You already have an active session. Finish or cancel it first.")]
    AlreadyActive,

    #[error("Server on port {0} not found")]
    ServerNotFound(u16),
}

/// Preconditions checked once at boot; any of these aborts the daemon.
#[derive(Debug, Clone, Error)]
pub enum StartupError {
    #[error("Java runtime unavailable ({java}): {reason}")]
    JavaMissing { java: String, reason: String },

    #[error("Cannot create data directory {path}: {reason}")]
    DataDir { path: String, reason: String },

    #[error("Failed to load servers: {0}")]
    Store(#[from] StoreError),
}

/// Failure classes surfaced at the control boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Upstream,
    Process,
    Storage,
}

#[derive(Debug, Clone, Error)]
pub enum ControlError {
    #[error("{0}")]
    Validation(String),

    #[error("Server on port {0} not found")]
    NotFound(u16),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Process(ServerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Filesystem error on {path}: {reason}")]
    Io { path: String, reason: String },
}

impl ControlError {
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        ControlError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Validation(_) => ErrorKind::Validation,
            ControlError::NotFound(_) => ErrorKind::NotFound,
            ControlError::Conflict(_) => ErrorKind::Conflict,
            ControlError::Artifact(_) => ErrorKind::Upstream,
            ControlError::Process(_) => ErrorKind::Process,
            ControlError::Store(_) | ControlError::Io { .. } => ErrorKind::Storage,
        }
    }
}

impl From<ServerError> for ControlError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Artifact(inner) => ControlError::Artifact(inner),
            other => ControlError::Process(other),
        }
    }
}

impl From<ConfigError> for ControlError {
    fn from(err: ConfigError) -> Self {
        ControlError::Validation(err.to_string())
    }
}

impl From<HandleError> for ControlError {
    fn from(err: HandleError) -> Self {
        ControlError::Validation(err.to_string())
    }
}

impl From<FetchError> for ControlError {
    fn from(err: FetchError) -> Self {
        ControlError::Artifact(ArtifactError::Download(err))
    }
}
