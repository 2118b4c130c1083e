use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::{
    config::{MemorySpec, ServerType, ServerVersion},
    instance::{InstanceHandle, InstanceStatus},
};

pub const DEFAULT_MOTD: &str = "A Minecraft Server";
pub const DEFAULT_MAX_PLAYERS: u32 = 20;

/// Persisted description of one server, keyed by port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub port: u16,
    pub server_type: ServerType,
    pub version: ServerVersion,
    pub status: InstanceStatus,
    pub memory: MemorySpec,
    pub motd: String,
    pub max_players: u32,
    pub auto_start: bool,
    pub last_started: Option<DateTime<Utc>>,
}

impl ServerRecord {
    pub fn new(port: u16, server_type: ServerType, version: ServerVersion, memory: MemorySpec) -> Self {
        Self {
            port,
            server_type,
            version,
            status: InstanceStatus::Stopped,
            memory,
            motd: DEFAULT_MOTD.to_string(),
            max_players: DEFAULT_MAX_PLAYERS,
            auto_start: false,
            last_started: None,
        }
    }
}

/// Input of `ServerRegistry::create_server`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSpec {
    pub port: u16,
    pub server_type: ServerType,
    pub version: ServerVersion,
    pub memory: MemorySpec,
    pub motd: Option<String>,
    pub max_players: Option<u32>,
    pub auto_start: bool,
}

/// Partial update of the mutable settings of a server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub memory: Option<MemorySpec>,
    pub motd: Option<String>,
    pub max_players: Option<u32>,
    pub auto_start: Option<bool>,
}

/// Record plus the most recent lines of its log.
#[derive(Debug, Clone)]
pub struct ServerStatusReport {
    pub record: ServerRecord,
    pub logs: Vec<String>,
}

/// Number of servers in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub total: usize,
    pub stopped: usize,
    pub starting: usize,
    pub running: usize,
    pub stopping: usize,
    pub error: usize,
}

impl ServerStats {
    pub fn count(&mut self, status: InstanceStatus) {
        self.total += 1;
        match status {
            InstanceStatus::Stopped => self.stopped += 1,
            InstanceStatus::Starting => self.starting += 1,
            InstanceStatus::Running => self.running += 1,
            InstanceStatus::Stopping => self.stopping += 1,
            InstanceStatus::Error => self.error += 1,
        }
    }
}

/// A registered server. `handle` serializes lifecycle operations on the port.
#[derive(Debug)]
pub struct ManagedServer {
    pub record: Arc<RwLock<ServerRecord>>,
    pub handle: Mutex<InstanceHandle>,
}

impl ManagedServer {
    pub fn new(record: Arc<RwLock<ServerRecord>>, handle: InstanceHandle) -> Self {
        Self {
            record,
            handle: Mutex::new(handle),
        }
    }

    pub async fn snapshot(&self) -> ServerRecord {
        self.record.read().await.clone()
    }
}
