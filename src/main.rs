use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use box_office_server::config::Config;
use box_office_server::routes::create_routes;
use box_office_server::services::AuditPipeline;
use box_office_server::state::AppState;
use box_office_server::store::{MemoryStore, PgStore, RecordStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = run(Config::from_env()).await {
        tracing::error!("Server failed: {}", err);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections).await?;
            tracing::info!("Successfully connected to database");
            store.migrate().await?;
            tracing::info!("Migrations run successfully");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, records are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let (audit, writer) = AuditPipeline::new(Arc::clone(&store), config.audit_queue_capacity);
    let worker = writer.spawn();

    let app = create_routes(AppState::new(store, audit), &config);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router and its audit handles are gone; flush what is still queued.
    worker.shutdown(config.audit_drain_timeout).await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
