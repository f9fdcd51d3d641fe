//! # Tableside API Server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  phones / kitchen / waiter ───► HTTP (8080) ───► Engine ───► SQLite    │
//! │                                     ▲                                   │
//! │                                     └──── SSE change feed               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `tableside-api [--config path/to/tableside.toml]`

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tableside_api::{router, AppState};
use tableside_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tableside=debug,sqlx=warn")),
        )
        .with_target(true)
        .init();

    info!("Starting Tableside API server...");

    let config = EngineConfig::load(config_path()).context("loading configuration")?;
    let addr = config.server.bind_address();
    info!(
        %addr,
        request_timeout_secs = config.server.request_timeout_secs,
        "Configuration loaded"
    );

    let engine = Engine::open(config).await.context("opening engine")?;
    let app = router(AppState::new(engine.clone()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    engine.db().close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// `--config <path>` from the command line, if given.
fn config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
