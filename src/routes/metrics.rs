use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Install the global Prometheus recorder and describe the pipeline metrics.
pub fn install_recorder() -> Result<Arc<PrometheusHandle>, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(
        "embedding_jobs_published_total",
        "Embedding jobs published to the job queue"
    );
    metrics::describe_counter!(
        "embedding_jobs_dispatch_failed_total",
        "Upload batches whose embedding job could not be published"
    );
    metrics::describe_counter!(
        "embedding_jobs_untracked_total",
        "Embedding jobs published whose progress record could not be created"
    );
    metrics::describe_counter!(
        "embedding_results_received_total",
        "Embedding result messages taken off the result queue"
    );
    metrics::describe_counter!(
        "embedding_results_duplicate_total",
        "Embedding results ignored because the photo was already counted"
    );
    metrics::describe_counter!(
        "embedding_results_dropped_total",
        "Embedding results discarded, by reason"
    );
    metrics::describe_counter!(
        "embedding_results_redelivered_total",
        "Embedding results put back on the queue after a store failure"
    );
    metrics::describe_counter!(
        "embedding_batches_finished_total",
        "Upload batches that reached a terminal status"
    );
    metrics::describe_gauge!(
        "embedding_results_queue_depth",
        "Embedding results waiting to be consumed"
    );

    Ok(Arc::new(handle))
}

/// `GET /metrics` with its own state, mergeable into the API router.
pub fn metrics_router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(handle)
}

async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
