use std::{
    fmt::{self, Display},
    str::FromStr,
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

mod settings;
pub mod stream;

pub use settings::{Endpoints, Settings, StopPolicy};
pub use stream::{LogLevel, LogMeta, LogRecord, StreamLine, StreamSource};

static MEMORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[MG]$").expect("memory regex is valid"));

/// Upstream software variant a server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Vanilla,
    Paper,
    Purpur,
    Fabric,
    Velocity,
    Mrpack,
}

impl ServerType {
    pub const ALL: [ServerType; 6] = [
        ServerType::Vanilla,
        ServerType::Paper,
        ServerType::Purpur,
        ServerType::Fabric,
        ServerType::Velocity,
        ServerType::Mrpack,
    ];

    /// Types offered by the creation wizard.
    pub const WIZARD_CHOICES: [ServerType; 5] = [
        ServerType::Vanilla,
        ServerType::Paper,
        ServerType::Purpur,
        ServerType::Fabric,
        ServerType::Mrpack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::Vanilla => "vanilla",
            ServerType::Paper => "paper",
            ServerType::Purpur => "purpur",
            ServerType::Fabric => "fabric",
            ServerType::Velocity => "velocity",
            ServerType::Mrpack => "mrpack",
        }
    }

    /// Directory (relative to the working directory) holding plugins or mods.
    pub fn plugin_folder(&self) -> &'static str {
        match self {
            ServerType::Fabric => "mods",
            _ => "plugins",
        }
    }
}

impl Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ServerType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownServerType(s.trim().to_string()))
    }
}

/// Version selector. Opaque to everything except the resolver; the
/// `uploaded:<file>` form names a previously uploaded modpack archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ServerVersion {
    Release(String),
    Uploaded(String),
}

const UPLOADED_PREFIX: &str = "uploaded:";

fn is_safe_component(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'))
}

impl ServerVersion {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, ServerVersion::Uploaded(_))
    }
}

impl Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerVersion::Release(v) => write!(f, "{v}"),
            ServerVersion::Uploaded(file) => write!(f, "{UPLOADED_PREFIX}{file}"),
        }
    }
}

impl FromStr for ServerVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(file) = s.strip_prefix(UPLOADED_PREFIX) {
            if !is_safe_component(file) {
                return Err(ConfigError::InvalidVersion(s.to_string()));
            }
            return Ok(ServerVersion::Uploaded(file.to_string()));
        }

        if !is_safe_component(s) {
            return Err(ConfigError::InvalidVersion(s.to_string()));
        }
        Ok(ServerVersion::Release(s.to_string()))
    }
}

impl TryFrom<String> for ServerVersion {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServerVersion> for String {
    fn from(value: ServerVersion) -> Self {
        value.to_string()
    }
}

/// Heap size, `<digits>M` or `<digits>G`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemorySpec(String);

impl MemorySpec {
    pub fn heap_flag(&self) -> String {
        format!("-Xmx{}", self.0)
    }
}

impl Default for MemorySpec {
    fn default() -> Self {
        Self("2G".to_string())
    }
}

impl Display for MemorySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemorySpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if MEMORY_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ConfigError::InvalidMemory(s.to_string()))
        }
    }
}

impl TryFrom<String> for MemorySpec {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MemorySpec> for String {
    fn from(value: MemorySpec) -> Self {
        value.0
    }
}
