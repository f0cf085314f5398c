use sqlx::PgPool;
use std::sync::Arc;

use crate::db::NotificationStore;
use crate::pipeline::EmbeddingProducer;
use crate::services::{
    auth::AuthService, inference::InferenceClient, queue::MessageQueue, uploads::UploadStore,
};

/// Shared application state passed to all route handlers.
///
/// Built once at startup; every handle in here is safe to share between
/// concurrent requests.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub notifications: Arc<dyn NotificationStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub producer: Arc<EmbeddingProducer>,
    pub inference: Arc<InferenceClient>,
    pub auth: Arc<AuthService>,
    pub uploads: Arc<UploadStore>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        notifications: Arc<dyn NotificationStore>,
        queue: Arc<dyn MessageQueue>,
        producer: Arc<EmbeddingProducer>,
        inference: InferenceClient,
        auth: AuthService,
        uploads: UploadStore,
    ) -> Self {
        Self {
            db,
            notifications,
            queue,
            producer,
            inference: Arc::new(inference),
            auth: Arc::new(auth),
            uploads: Arc::new(uploads),
        }
    }
}
