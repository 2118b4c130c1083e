use std::fmt::{self, Display};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::line::{StreamLine, StreamSource};

/// Header fields of a vanilla-style log line: `[time] [thread/LEVEL]: msg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub time: String,
    pub thread: String,
    pub level: LogLevel,
    pub msg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Other,
}

impl LogMeta {
    /// Returns `None` for lines that do not follow the header layout.
    pub fn new<S: AsRef<str>>(line: S) -> Option<Self> {
        let line = line.as_ref().trim();

        if !line.starts_with('[') {
            return None;
        }

        let time_end = line.find(']')?;
        let time = line[1..time_end].to_string();

        let meta_start = time_end + 1 + line[time_end + 1..].find('[')?;
        let msg_sep = meta_start + line[meta_start..].find("]: ")?;

        let meta = &line[(meta_start + 1)..msg_sep];
        let msg = line[(msg_sep + 3)..].to_string();

        let (thread, level_str) = meta.rsplit_once('/')?;

        Some(LogMeta {
            time,
            thread: thread.to_string(),
            level: LogLevel::from_label(level_str),
            msg,
        })
    }
}

impl LogLevel {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "INFO" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" | "FATAL" | "SEVERE" => LogLevel::Error,
            _ => LogLevel::Other,
        }
    }
}

impl Display for LogMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time: {}\nThread: {}\nLevel: {}\nMessage: {}",
            self.time, self.thread, self.level, self.msg
        )
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Other => write!(f, "OTHER"),
        }
    }
}

/// One append-only entry of a server's log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn new<S: Into<String>>(level: LogLevel, message: S) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info<S: Into<String>>(message: S) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn<S: Into<String>>(message: S) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// Record for a line of process output. Lines without a recognised
    /// header are kept verbatim at `INFO`, or `WARN` when read from stderr.
    pub fn from_line(line: &StreamLine) -> Self {
        let fallback = match line.source {
            StreamSource::Stdout => LogLevel::Info,
            StreamSource::Stderr => LogLevel::Warn,
        };
        let level = LogMeta::new(line.msg())
            .map(|meta| meta.level)
            .unwrap_or(fallback);

        Self {
            timestamp: line.timestamp().unwrap_or_else(Utc::now),
            level,
            message: line.msg().trim().to_string(),
        }
    }
}

impl Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.timestamp.with_timezone(&Local);
        write!(f, "[{}] {}", local.format("%H:%M:%S"), self.message)
    }
}
