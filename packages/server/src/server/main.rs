// Main entry point for the coin toss API server

use std::sync::Arc;

use anyhow::{Context, Result};
use coin_toss_core::kernel::{BaseExperimentStore, MemoryStore, PgStore, ServerDeps, StreamHub};
use coin_toss_core::{server::build_app, Config, StoreBackend};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coin_toss_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting coin toss API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(backend = ?config.store_backend, "Configuration loaded");

    let (store, stream_hub): (Arc<dyn BaseExperimentStore>, _) = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; sessions are lost on restart");
            let store = MemoryStore::new();
            let hub = store.hub().clone();
            let store: Arc<dyn BaseExperimentStore> = Arc::new(store);
            (store, hub)
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;

            // Connect to database
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");

            // Run migrations
            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            let hub = StreamHub::new();
            let store: Arc<dyn BaseExperimentStore> =
                Arc::new(PgStore::connect(pool, hub.clone()).await?);
            (store, hub)
        }
    };

    let deps = ServerDeps::new(store, stream_hub, config.public_base_url.clone());
    let app = build_app(deps, config.allowed_origins.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
