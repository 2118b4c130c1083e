pub mod domain;
mod registry;

pub use domain::{
    ManagedServer, ServerRecord, ServerSpec, ServerStats, ServerStatusReport, SettingsUpdate,
};
pub use registry::{STATUS_LOG_LINES, ServerRegistry, UploadedModpack};
