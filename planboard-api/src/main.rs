//! # Planboard API Server
//!
//! REST backend for projects, Kanban boards, activity and reports.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/planboard JWT_SECRET=... cargo run -p planboard-api
//! ```
//!
//! Migrations run on startup. The server stops accepting connections on
//! Ctrl-C or SIGTERM and finishes in-flight requests before exiting.

use anyhow::Context;
use planboard_api::{
    app::{build_router, AppState},
    config::{Config, LogFormat},
};
use planboard_shared::db::{
    migrations::{ensure_database_exists, run_migrations},
    pool::{close_pool, create_pool, DatabaseConfig},
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "planboard_api=debug,planboard_shared=info,tower_http=info";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, draining connections");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(config.log_format);

    tracing::info!("Planboard API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    ensure_database_exists(&config.database.url)
        .await
        .context("Failed to prepare database")?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await
    .context("Failed to connect to database")?;

    run_migrations(&pool).await.context("Failed to run database migrations")?;

    let address = config.bind_address();
    let app = build_router(AppState::new(pool.clone(), config));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}
