//! Records Portal Server
//!
//! Serves the portal HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store
//! cargo run --bin server
//!
//! # PostgreSQL store
//! STORE_BACKEND=postgres DATABASE_URL=postgres://... \
//!   cargo run --bin server --features postgres
//! ```

use records_portal::metrics::describe_metrics;
use records_portal::{AppState, Config, PortalServices, build_router};
use records_runtime::metrics::MetricsRecorder;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,records_portal=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        backend = ?config.store.backend,
        address = %config.server.bind_address(),
        "Configuration loaded"
    );
    if config.qr.uses_development_secret() {
        tracing::warn!("QR_SIGNING_SECRET is not set; pickup tokens use the development secret");
    }

    let services = PortalServices::from_config(&config).await?;

    let mut state = AppState::new(services.clone());
    match MetricsRecorder::install() {
        Ok(recorder) => {
            describe_metrics();
            state = state.with_metrics(recorder);
        },
        Err(error) => tracing::warn!(%error, "Metrics disabled"),
    }

    let sweeper = services.spawn_sweeper(&config);

    let app = build_router(state);
    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        let grace = Duration::from_secs(config.server.shutdown_timeout);
        if tokio::time::timeout(grace, sweeper.stop()).await.is_err() {
            tracing::warn!("Archive sweeper did not stop within the shutdown timeout");
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(error) => {
                tracing::error!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        () = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
