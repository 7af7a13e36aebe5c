use std::sync::Arc;

use anyhow::Context;
use relay_cli::config::ServerConfig;
use relay_cli::{AppState, router};
use relay_core::{RelayBuilder, RelayConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_core=info,relay_cli=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let server = ServerConfig::from_env().context("loading server configuration")?;
    let config = RelayConfig::from_env().context("loading relay configuration")?;
    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        pool_size = config.pool_size,
        history_cap = config.history_cap,
        "loaded relay configuration"
    );

    // --- Relay ---
    let relay = RelayBuilder::new(config)
        .with_defaults()
        .await
        .context("opening relay components")?
        .build()
        .context("building relay")?;
    let relay = Arc::new(relay);

    relay.recover().await.context("recovering stored tasks")?;
    let handle = relay.start()?;

    // --- Server ---
    let app = router(AppState {
        relay: Arc::clone(&relay),
    });
    let addr = server.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // --- Post-shutdown ---
    tracing::info!("server stopped accepting connections");
    relay.status().await.log();
    let report = handle.shutdown().await;
    if !report.drained {
        tracing::warn!("some tasks were still running; they resume on next start");
    }
    Ok(())
}

/// Wait for Ctrl-C (and SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
