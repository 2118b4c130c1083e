use std::{path::PathBuf, time::Duration};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_STOP_POLLS: u32 = 30;
const DEFAULT_STOP_POLL_MS: u64 = 1000;
const DEFAULT_TERM_GRACE_SECS: u64 = 5;
const DEFAULT_RESTART_SETTLE_SECS: u64 = 5;
const DEFAULT_PORT_MIN: u16 = 25565;
const DEFAULT_PORT_MAX: u16 = 26000;

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str) -> Option<u64> {
    env_string(name).and_then(|v| v.parse::<u64>().ok())
}

fn env_u16(name: &str) -> Option<u16> {
    env_string(name).and_then(|v| v.parse::<u16>().ok())
}

/// Escalation timings for `stop()`: graceful polls, then SIGTERM, then SIGKILL.
#[derive(Debug, Clone, Copy)]
pub struct StopPolicy {
    pub graceful_polls: u32,
    pub poll_interval: Duration,
    pub term_grace: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            graceful_polls: DEFAULT_STOP_POLLS,
            poll_interval: Duration::from_millis(DEFAULT_STOP_POLL_MS),
            term_grace: Duration::from_secs(DEFAULT_TERM_GRACE_SECS),
        }
    }
}

/// Metadata endpoints of the upstream providers.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub mojang_manifest: String,
    pub papermc: String,
    pub purpur: String,
    pub fabric: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            mojang_manifest: "https://launchermeta.mojang.com/mc/game/version_manifest.json"
                .to_string(),
            papermc: "https://api.papermc.io/v2/projects".to_string(),
            purpur: "https://api.purpurmc.org/v2/purpur".to_string(),
            fabric: "https://meta.fabricmc.net/v2/versions".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub java_path: String,
    pub http_timeout: Duration,
    pub stop: StopPolicy,
    pub restart_settle: Duration,
    pub port_range: (u16, u16),
    pub endpoints: Endpoints,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            java_path: "java".to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            stop: StopPolicy::default(),
            restart_settle: Duration::from_secs(DEFAULT_RESTART_SETTLE_SECS),
            port_range: (DEFAULT_PORT_MIN, DEFAULT_PORT_MAX),
            endpoints: Endpoints::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let mut settings = Settings::default();

        if let Some(dir) = env_string("CRAFTKEEPER_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(java) = env_string("CRAFTKEEPER_JAVA") {
            settings.java_path = java;
        }
        if let Some(secs) = env_u64("CRAFTKEEPER_HTTP_TIMEOUT_SECS") {
            settings.http_timeout = Duration::from_secs(secs.clamp(10, 30));
        }
        if let Some(polls) = env_u64("CRAFTKEEPER_STOP_POLLS") {
            settings.stop.graceful_polls = polls.clamp(1, 600) as u32;
        }
        if let Some(ms) = env_u64("CRAFTKEEPER_STOP_POLL_MS") {
            settings.stop.poll_interval = Duration::from_millis(ms.clamp(50, 10_000));
        }
        if let Some(secs) = env_u64("CRAFTKEEPER_TERM_GRACE_SECS") {
            settings.stop.term_grace = Duration::from_secs(secs.clamp(1, 60));
        }
        if let Some(secs) = env_u64("CRAFTKEEPER_RESTART_SETTLE_SECS") {
            settings.restart_settle = Duration::from_secs(secs.clamp(0, 60));
        }

        let min = env_u16("CRAFTKEEPER_PORT_MIN").unwrap_or(DEFAULT_PORT_MIN);
        let max = env_u16("CRAFTKEEPER_PORT_MAX").unwrap_or(DEFAULT_PORT_MAX);
        if min <= max {
            settings.port_range = (min, max);
        }

        settings
    }

    pub fn servers_dir(&self) -> PathBuf {
        self.data_dir.join("servers")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    /// Working directory of the server bound to `port`.
    pub fn server_dir(&self, port: u16) -> PathBuf {
        self.servers_dir().join(port.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.stop.graceful_polls, 30);
        assert_eq!(s.stop.term_grace, Duration::from_secs(5));
        assert_eq!(s.http_timeout, Duration::from_secs(20));
        assert_eq!(s.port_range, (25565, 26000));
        assert_eq!(s.server_dir(25565), PathBuf::from("data/servers/25565"));
    }
}
