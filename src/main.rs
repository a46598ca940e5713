//! admin_api: standalone server for the Book Maker admin gateway.
//!
//! Configuration comes from flags or env vars (see `GatewayConfig`); a `.env`
//! file in the working directory is loaded first when present.

use std::sync::Arc;

use anyhow::{Context, Result};
use bookmaker_admin_api::config::GatewayConfig;
use bookmaker_admin_api::store::{MemoryStore, PgStore, RowStore};
use bookmaker_admin_api::{build_router, AppState};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bookmaker_admin_api=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::parse();

    if config.admin_secret.as_deref().map_or(true, str::is_empty) {
        tracing::error!("ADMIN_API_SECRET is not set; every request will be rejected");
    }

    let store: Arc<dyn RowStore> = if config.in_memory {
        tracing::warn!("Serving from the in-memory store; data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set unless --in-memory is given")?;

        // Lazy so the gateway comes up even when the database is not reachable yet.
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect_lazy(database_url)
            .context("invalid DATABASE_URL")?;
        tracing::info!(schema = %config.db_schema, "Using Postgres store");
        Arc::new(PgStore::new(pool, config.db_schema.clone()))
    };

    let app = build_router(
        AppState::new(store, config.admin_secret.clone()),
        config.max_body_bytes,
    );

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!("admin_api listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("admin_api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
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
                tracing::error!("failed to listen for SIGTERM: {e}");
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
