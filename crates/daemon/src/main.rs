//! Queueline Daemon - Main Entry Point
//! SQLite store + queue coordinator + JSON-RPC server

mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use queueline_api_rpc::RpcServer;
use queueline_core::application::{
    shutdown_channel, QueueCoordinator, RegistrySweeper, StoreWatcher,
};
use queueline_core::port::id_provider::UuidProvider;
use queueline_core::port::time_provider::SystemTimeProvider;
use queueline_core::port::ChangeStream;
use queueline_infra_sqlite::{create_pool, run_migrations, SqliteEntryRepository};
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    init_logging()?;
    info!("Queueline daemon v{} starting...", VERSION);

    // 2. Load configuration
    let settings = Settings::load().context("Invalid configuration")?;
    let db_path = settings.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }

    // 3. Initialize database
    info!(db_path = %db_path.display(), "Initializing database...");
    let pool = create_pool(&db_path.to_string_lossy())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let repo = Arc::new(SqliteEntryRepository::new(pool.clone()));
    let changes = repo.subscribe_changes();
    let coordinator = Arc::new(QueueCoordinator::new(
        repo,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        settings.coordinator(),
    ));

    // 5. Background tasks
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let watcher = StoreWatcher::new(coordinator.clone(), changes);
    let watcher_handle = tokio::spawn(watcher.run(shutdown_rx.clone()));

    let sweeper = RegistrySweeper::new(coordinator.clone(), settings.sweep_interval());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    // 6. Start JSON-RPC server
    let server = RpcServer::new(settings.rpc(), coordinator.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(
        addr = %server.addr,
        average_service_minutes = coordinator.average_service_minutes(),
        "System ready. Press Ctrl+C to shutdown"
    );

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    server
        .handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    server.handle.stopped().await;

    let background = async {
        let _ = watcher_handle.await;
        let _ = sweeper_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, background).await.is_err() {
        warn!("Background tasks did not stop in time");
    }
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}

/// `RUST_LOG` filter (default `queueline=info`), `QUEUELINE_LOG_FORMAT=json` for JSON lines
fn init_logging() -> Result<()> {
    let log_format =
        std::env::var("QUEUELINE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("queueline=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}
