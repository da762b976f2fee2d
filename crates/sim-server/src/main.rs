mod config;
mod wiring;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "sim_server=info,api=info,runtime=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let engine = runtime::spawn(config.engine_options())?;
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "trade simulator listening");

    axum::serve(listener, wiring::build_app(engine.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let cancelled = engine.shutdown().await?;
    info!(cancelled, "trade simulator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "ctrl-c handler unavailable, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
