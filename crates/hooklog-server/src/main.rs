mod api;

use crate::api::{router, AppState};
use anyhow::{Context, Result};
use hooklog_config::HooklogConfig;
use hooklog_core::Recorder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = HooklogConfig::load(None).context("failed to load configuration")?;

    let recorder = Recorder::new(Arc::new(config.store.open()));
    let app = router(AppState { recorder }, &config.server);

    info!(
        addr = %config.server.bind,
        callback_path = %config.server.callback_path,
        log_path = %config.store.path.display(),
        sync = config.store.sync,
        "starting hooklog server"
    );

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server failed unexpectedly")?;

    info!("hooklog server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
