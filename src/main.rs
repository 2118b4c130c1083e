use std::{process::ExitCode, sync::Arc};

use craftkeeper::{
    config::Settings,
    http::ReqwestClient,
    server::ServerRegistry,
    store::JsonStore,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    info!(data_dir = %settings.data_dir.display(), java = %settings.java_path, "craftkeeper starting");

    let http = match ReqwestClient::new(settings.http_timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "failed to build http client");
            return ExitCode::FAILURE;
        }
    };

    let store = match JsonStore::open(settings.db_dir()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to open store");
            return ExitCode::FAILURE;
        }
    };

    let registry = match ServerRegistry::bootstrap(settings, http, store).await {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let stats = registry.server_stats().await;
    info!(total = stats.total, running = stats.running, "craftkeeper ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    info!("shutting down");
    registry.shutdown().await;
    ExitCode::SUCCESS
}
