use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::notification::{Notification, NotificationStatus, PhotoOutcome};
use crate::models::photo::Photo;

pub mod memory;
pub mod notification_queries;
pub mod photo_queries;
pub mod store;
pub mod user_queries;

pub use memory::InMemoryStore;
pub use store::{NotificationStore, PhotoStore, ProgressUpdate, StoreError};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Postgres-backed store handed to the pipeline.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        notification_queries::create_notification(&self.pool, notification).await?;
        Ok(())
    }

    async fn record_result(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        photo_key: &str,
        outcome: PhotoOutcome,
    ) -> Result<ProgressUpdate, StoreError> {
        notification_queries::record_result(&self.pool, user_id, batch_id, photo_key, outcome).await
    }

    async fn set_status(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        status: NotificationStatus,
        message: &str,
    ) -> Result<bool, StoreError> {
        Ok(notification_queries::set_status(&self.pool, user_id, batch_id, status, message).await?)
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        Ok(notification_queries::list_for_user(&self.pool, user_id).await?)
    }

    async fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        Ok(notification_queries::mark_read(&self.pool, user_id, ids).await?)
    }
}

#[async_trait]
impl PhotoStore for PgStore {
    async fn mark_embedded(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        name: &str,
        path: &str,
    ) -> Result<u64, StoreError> {
        Ok(photo_queries::mark_embedded(&self.pool, user_id, batch_id, name, path).await?)
    }

    async fn find_photo(
        &self,
        user_id: Uuid,
        batch_id: Option<Uuid>,
        name: &str,
        path: &str,
    ) -> Result<Option<Photo>, StoreError> {
        Ok(photo_queries::find_photo(&self.pool, user_id, batch_id, name, path).await?)
    }
}
