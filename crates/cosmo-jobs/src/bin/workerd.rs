//! cosmo-workerd: the cosmograph pipeline worker daemon.
//!
//! Runs both pipeline consumers (embedding generation and spatial projection)
//! against the shared job queue. Shuts down gracefully on ctrl-c: in-flight
//! jobs finish before the process exits.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cosmo_core::EventBus;
use cosmo_db::Database;
use cosmo_inference::{OllamaEmbedder, ReductionClient};
use cosmo_jobs::{
    EmbeddingHandler, ProjectionConfig, ProjectionHandler, UserLocks, WorkerBuilder, WorkerConfig,
    WorkerEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,cosmo_jobs=debug")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::connect(&database_url).await?;
    cosmo_db::log_pool_metrics(db.pool());

    let embedder = Arc::new(OllamaEmbedder::from_env());
    let reducer = Arc::new(ReductionClient::from_env());

    // Startup probe is advisory only: the projection handler degrades to
    // deterministic fallback coordinates when the service is down.
    match reducer.health().await {
        Ok(health) => info!(status = %health.status, "Reduction service healthy"),
        Err(e) => warn!(error = %e, "Reduction service unreachable; projection will degrade"),
    }

    let events = EventBus::default();
    let projection = ProjectionHandler::new(
        &db,
        reducer,
        ProjectionConfig::from_env(),
        UserLocks::new(),
        events.clone(),
    );
    let embedding = EmbeddingHandler::new(Arc::new(db.vectors.clone()), embedder);

    let worker = WorkerBuilder::for_database(&db)
        .with_config(WorkerConfig::from_env())
        .with_handler(embedding)
        .with_handler(projection)
        .build()
        .await;

    let mut worker_events = worker.events();
    let handle = worker.start();

    info!("cosmo-workerd running; press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received; draining in-flight jobs");
    handle.shutdown().await?;
    while let Ok(event) = worker_events.recv().await {
        if matches!(event, WorkerEvent::WorkerStopped) {
            break;
        }
    }

    Ok(())
}
