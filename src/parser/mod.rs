use std::sync::LazyLock;

use regex::Regex;

use crate::config::ServerType;

static DONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Done \([0-9.,]+s\)!").expect("done regex is valid"));

/// Lifecycle signal recognised in a line of server output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalEvent {
    ServerStarted,
    BootFailed,
}

/// Classifies one line of output for the given server type.
pub fn parse_event(server_type: ServerType, line: &str) -> Option<InternalEvent> {
    if line.contains("Failed to start") {
        return Some(InternalEvent::BootFailed);
    }

    let started = match server_type {
        ServerType::Velocity => DONE_RE.is_match(line),
        _ => line.contains("Done") && line.contains("For help"),
    };

    started.then_some(InternalEvent::ServerStarted)
}
