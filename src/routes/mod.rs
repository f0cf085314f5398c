use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod auth;
pub mod error;
pub mod extract;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod photos;

/// Largest multipart body accepted for an upload batch.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application routes, without the metrics endpoint, static files or
/// transport layers (those are added in `main`).
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/upload", post(photos::upload_photos))
        .route("/api/photos", get(photos::list_photos))
        .route("/api/search", get(photos::search_photos))
        .route("/api/search/image", post(photos::search_by_image))
        .route(
            "/api/notifications",
            get(notifications::list_notifications).post(notifications::mark_read),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
