use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use likeboard::config::{Cli, Config};
use likeboard::db;
use likeboard::routes;
use likeboard::state::AppState;
use likeboard::store::memory::MemoryDocumentStore;
use likeboard::store::sqlite::SqliteDocumentStore;
use likeboard::store::DynDocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    let store: DynDocumentStore = if config.database.in_memory {
        tracing::warn!("Running with an in-memory store; data is lost on exit");
        Arc::new(MemoryDocumentStore::new())
    } else {
        let db_path = config.db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!("Database: {}", db_path.display());

        let pool = db::create_pool(&db_path)?;
        db::run_migrations(&pool)?;
        Arc::new(SqliteDocumentStore::new(pool))
    };

    let state = AppState::new(config.clone(), store);

    // Sweep expired sessions in the background
    let sessions = state.sessions.clone();
    let purge_every = Duration::from_secs(config.auth.purge_interval_minutes.max(1) * 60);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            if let Err(e) = sessions.purge_expired(Utc::now()).await {
                tracing::warn!("Session purge failed: {}", e);
            }
        }
    });
    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
