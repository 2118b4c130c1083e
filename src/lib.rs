//! Minecraft server lifecycle engine.
//!
//! [`server::ServerRegistry`] owns every managed server: it resolves and
//! caches artifacts, supervises the Java processes and persists records and
//! logs. [`wizard::WizardEngine`] drives the multi-step chat flows on top of it.

pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod instance;
pub mod manifests;
pub mod parser;
pub mod server;
pub mod store;
pub mod utils;
pub mod wizard;

#[cfg(test)]
mod testing;
