use std::{
    fmt::{self, Display},
    path::PathBuf,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Where and how a supervised server is launched. What it runs comes from
/// its record at start time.
#[derive(Debug, Clone)]
pub struct InstanceData {
    pub port: u16,
    pub root_dir: PathBuf,
    pub java_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 5] = [
        InstanceStatus::Stopped,
        InstanceStatus::Starting,
        InstanceStatus::Running,
        InstanceStatus::Stopping,
        InstanceStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Running => "running",
            InstanceStatus::Stopping => "stopping",
            InstanceStatus::Error => "error",
        }
    }

    /// Edges of the lifecycle graph. `Error -> Stopping` covers tearing down
    /// a process that reported a boot failure but is still alive.
    pub fn can_transition(self, to: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, to),
            (Stopped, Starting)
                | (Starting, Running | Stopping | Error)
                | (Running, Stopping | Error)
                | (Stopping, Stopped)
                | (Error, Starting | Stopping)
        )
    }
}

impl Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        InstanceStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| ConfigError::InvalidStatus(s.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InstanceStatus::*;

    #[test]
    fn lifecycle_graph() {
        assert!(Stopped.can_transition(Starting));
        assert!(Starting.can_transition(Running));
        assert!(Running.can_transition(Stopping));
        assert!(Stopping.can_transition(Stopped));
        assert!(Starting.can_transition(Error));
        assert!(Error.can_transition(Starting));

        assert!(!Stopped.can_transition(Running));
        assert!(!Running.can_transition(Starting));
        assert!(!Stopped.can_transition(Stopping));
        assert!(!Error.can_transition(Running));
    }

    #[test]
    fn wire_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&Running).unwrap(), "\"running\"");
        assert_eq!("ERROR".parse::<InstanceStatus>().unwrap(), Error);
        assert!("crashed".parse::<InstanceStatus>().is_err());
    }
}
