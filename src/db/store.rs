use async_trait::async_trait;
use uuid::Uuid;

use crate::models::notification::{Notification, NotificationStatus, PhotoOutcome};
use crate::models::photo::Photo;

/// What a single photo result did to its batch record.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Counted; carries the post-increment record.
    Applied(Notification),
    /// This photo was already counted for the batch. Nothing changed.
    Duplicate(Notification),
    /// Every photo of the batch is already accounted for. Nothing changed.
    Saturated(Notification),
}

impl ProgressUpdate {
    pub fn notification(&self) -> &Notification {
        match self {
            ProgressUpdate::Applied(n)
            | ProgressUpdate::Duplicate(n)
            | ProgressUpdate::Saturated(n) => n,
        }
    }
}

/// Batch progress records. Every mutation is filtered by owner.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a pending record. A second insert for the same owner and batch
    /// is a no-op, so creation can be retried after an ambiguous failure.
    async fn create_notification(&self, notification: &Notification) -> Result<(), StoreError>;

    /// Count one photo toward `(user_id, batch_id)` exactly once.
    ///
    /// Claiming `photo_key`, bumping the matching counter and clearing `read`
    /// happen as one indivisible step. Fails with `StoreError::NotFound` when
    /// the owner has no record for the batch.
    async fn record_result(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        photo_key: &str,
        outcome: PhotoOutcome,
    ) -> Result<ProgressUpdate, StoreError>;

    /// Move a pending record to a terminal status. Returns false when the
    /// record was already terminal (or absent).
    async fn set_status(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        status: NotificationStatus,
        message: &str,
    ) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError>;

    /// Returns the number of records actually marked.
    async fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError>;
}

/// The slice of photo storage the result consumer touches.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Set `embedded = true`. An empty `path` matches on `name` instead.
    async fn mark_embedded(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        name: &str,
        path: &str,
    ) -> Result<u64, StoreError>;

    /// The owner's photo a result refers to: same path, or same name when
    /// `path` is empty. Limited to `batch_id` when given. Most recent upload wins.
    async fn find_photo(
        &self,
        user_id: Uuid,
        batch_id: Option<Uuid>,
        name: &str,
        path: &str,
    ) -> Result<Option<Photo>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No progress record for batch {batch_id}")]
    NotFound { batch_id: Uuid },

    #[error("Store unavailable")]
    Unavailable,
}
