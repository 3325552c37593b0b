use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use complaint_desk::complaints::spawn_sla_sweep;
use complaint_desk::config::ServerConfig;
use complaint_desk::server::{AppState, build_router};
use complaint_desk::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("Invalid configuration")?;

    // Initialize tracing: stderr always, plus a daily rolling file when configured.
    // The guard must live until exit so buffered lines get flushed.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "complaint-desk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("📋 Complaint Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/complaints", config.port);
    eprintln!("   Staff feed: ws://0.0.0.0:{}/ws/complaints", config.port);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Ticket prefix: {}", config.ticket_prefix);
    if config.gateway_secret.is_none() {
        eprintln!("   Warning: CMS_GATEWAY_SECRET not set, identity headers are trusted as-is");
    }

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Services ─────────────────────────────────────────────────────────
    let mut state = AppState::new(db, &config.ticket_prefix);
    if let Some(secret) = config.gateway_secret.clone() {
        state = state.with_gateway_secret(secret);
    }

    let _sweep_handle = spawn_sla_sweep(Arc::clone(&state.complaints), config.sla_sweep_interval);
    tracing::info!(
        every_secs = config.sla_sweep_interval.as_secs(),
        "SLA sweep started"
    );

    // ── HTTP / WS server ─────────────────────────────────────────────────
    let app = build_router(state, &config.cors_origins);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Complaint Desk listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
