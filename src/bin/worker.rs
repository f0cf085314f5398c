//! Standalone result consumer: drains `embedding_results` into batch
//! progress without serving HTTP. Run alongside (or instead of) the
//! consumer embedded in the server.

use photo_storage::{
    config::AppConfig,
    db::{self, PgStore},
    pipeline::Pipeline,
    services::queue::{MessageQueue, RedisQueue},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting embedding result worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connecting to Redis");
    let queue: Arc<dyn MessageQueue> = Arc::new(
        RedisQueue::connect(&config.redis_url)
            .await
            .expect("Failed to connect to Redis"),
    );

    let store = Arc::new(PgStore::new(db_pool));
    let pipeline = Pipeline::new(queue, store.clone(), store, config.pipeline());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("Worker ready, consuming embedding results");

    if let Err(e) = pipeline.consumer.clone().run(shutdown_rx).await {
        tracing::error!(error = %e, "Result consumer failed");
        std::process::exit(1);
    }

    tracing::info!("Worker stopped");
}
