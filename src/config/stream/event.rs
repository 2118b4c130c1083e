use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::instance::InstanceStatus;

use super::log::LogRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    StateChange {
        old: InstanceStatus,
        new: InstanceStatus,
    },

    Log {
        record: LogRecord,
    },
}

/// Broadcast to subscribers of a running server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceEvent {
    pub id: Uuid,

    pub port: u16,

    pub timestamp: DateTime<Utc>,

    pub payload: EventPayload,
}

impl InstanceEvent {
    pub fn state_change(port: u16, old: InstanceStatus, new: InstanceStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            port,
            timestamp: Utc::now(),
            payload: EventPayload::StateChange { old, new },
        }
    }

    pub fn log(port: u16, record: LogRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            port,
            timestamp: record.timestamp,
            payload: EventPayload::Log { record },
        }
    }
}

impl Display for InstanceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            EventPayload::Log { record } => write!(f, "[{}] {}", self.port, record),
            EventPayload::StateChange { old, new } => {
                write!(f, "[{}] State changed: {} -> {}", self.port, old, new)
            }
        }
    }
}
