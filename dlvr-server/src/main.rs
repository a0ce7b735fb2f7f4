//! dlvr server
//!
//! Simulates the lifecycle of confirmed food orders and delivers the
//! resulting notifications to customers in real time.

mod api;
mod config;
mod engine;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::file::StoreBackend;
use config::{ConfigLoader, get_database_url};
use dlvr_core::config::ConfigStore;
use dlvr_core::entities::{MemoryNotificationStore, NotificationStore, PgNotificationStore};
use dlvr_core::framework::DatabaseProcessor;
use engine::Engine;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// dlvr - order lifecycle simulation and notification delivery
#[derive(Parser, Debug)]
#[command(name = "dlvr-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./dlvr-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup (postgres store only)
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting dlvr-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let (store, db_pool) = open_store(loaded_config.store, args.migrate).await?;

    // Start the processors
    let alerts = ConfigStore::new(loaded_config.alerts);
    let engine = Engine::start(
        loaded_config.scheduler,
        loaded_config.stream,
        store,
        alerts.clone(),
    );

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(alerts, config_loader);

    // Build the router
    let router = build_router(engine.state());

    // Run the server
    tracing::info!("Starting HTTP server on {}", loaded_config.listen);
    let result = run_server(router, loaded_config.listen, engine.shutdown_trigger()).await;

    // Signal the config reload handler to stop
    reload_notify.notify_one();

    tracing::info!("Stopping processors...");
    engine.shutdown().await;

    if let Some(pool) = db_pool {
        tracing::info!("Closing database connections...");
        pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Open the configured notification store.
async fn open_store(
    backend: StoreBackend,
    migrate: bool,
) -> anyhow::Result<(Arc<dyn NotificationStore>, Option<PgPool>)> {
    match backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory notification store");
            Ok((Arc::new(MemoryNotificationStore::new()), None))
        }
        StoreBackend::Postgres => {
            let database_url = get_database_url().map_err(|e| {
                tracing::error!("DATABASE_URL environment variable not set");
                e
            })?;

            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&database_url)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to database: {}", e);
                    e
                })?;
            tracing::info!("Database connection established");

            if migrate {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("../migrations")
                    .run(&db_pool)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to run migrations: {}", e);
                        e
                    })?;
                tracing::info!("Migrations completed successfully");
            }

            let store = PgNotificationStore::new(DatabaseProcessor {
                pool: db_pool.clone(),
            });
            Ok((Arc::new(store), Some(db_pool)))
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
