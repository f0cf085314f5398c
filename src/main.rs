use axum::http::HeaderValue;
use axum::Router;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photo_storage::app_state::AppState;
use photo_storage::config::AppConfig;
use photo_storage::db::{self, PgStore};
use photo_storage::pipeline::Pipeline;
use photo_storage::routes;
use photo_storage::services::{
    auth::AuthService,
    inference::InferenceClient,
    queue::{MessageQueue, RedisQueue},
    uploads::UploadStore,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing photo-storage server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle =
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder");

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Connecting to Redis message queue");
    let queue: Arc<dyn MessageQueue> = Arc::new(
        RedisQueue::connect(&config.redis_url)
            .await
            .expect("Failed to connect to Redis"),
    );

    let store = Arc::new(PgStore::new(db_pool.clone()));
    let pipeline = Pipeline::new(queue.clone(), store.clone(), store.clone(), config.pipeline());

    let inference =
        InferenceClient::new(&config.inference_url).expect("Failed to initialize inference client");
    let auth = AuthService::new(&config.jwt_secret);
    let uploads = UploadStore::new(&config.upload_dir);
    uploads
        .ensure_dir()
        .await
        .expect("Failed to create upload directory");

    let state = AppState::new(
        db_pool,
        store,
        queue,
        pipeline.producer.clone(),
        inference,
        auth,
        uploads,
    );

    let app = Router::new()
        .merge(routes::api_router(state))
        .merge(routes::metrics::metrics_router(prometheus_handle))
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.cors_origin))
        .layer(RequestBodyLimitLayer::new(routes::MAX_UPLOAD_BYTES));

    // Result consumer runs for the lifetime of the server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumer = tokio::spawn(pipeline.consumer.clone().run(shutdown_rx));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    tokio::select! {
        served = server => {
            if let Err(e) = served {
                tracing::error!(error = %e, "Server error");
            }
            let _ = shutdown_tx.send(true);
            match consumer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Result consumer stopped with error"),
                Err(e) => tracing::error!(error = %e, "Result consumer task panicked"),
            }
        }
        stopped = &mut consumer => {
            match stopped {
                Ok(Ok(())) => tracing::warn!("Result consumer exited early"),
                Ok(Err(e)) => tracing::error!(error = %e, "Result consumer failed"),
                Err(e) => tracing::error!(error = %e, "Result consumer task panicked"),
            }
            std::process::exit(1);
        }
    }

    tracing::info!("Server stopped");
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            tracing::warn!(origin, "Invalid CORS_ORIGIN, allowing any origin");
            layer.allow_origin(Any)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
