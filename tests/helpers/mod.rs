//! Shared harness for pipeline tests: the real producer, tracker and
//! consumer wired to the in-memory queue and store.

#![allow(dead_code)]

use async_trait::async_trait;
use photo_storage::db::{InMemoryStore, NotificationStore, ProgressUpdate, StoreError};
use photo_storage::models::messages::{
    EmbeddingResult, ResultStatus, MESSAGE_VERSION, RESULTS_QUEUE,
};
use photo_storage::models::notification::{Notification, NotificationStatus, PhotoOutcome};
use photo_storage::models::photo::Photo;
use photo_storage::pipeline::{Pipeline, PipelineConfig};
use photo_storage::services::queue::{InMemoryQueue, MessageQueue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct Harness {
    pub queue: Arc<InMemoryQueue>,
    pub store: Arc<InMemoryStore>,
    /// Sits in front of `store` for every progress write the pipeline makes.
    pub faults: Arc<FaultyStore>,
    pub pipeline: Pipeline,
}

/// Short timeouts and no real waiting between retries.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        operation_timeout: Duration::from_millis(500),
        concurrency: 4,
        not_found_retries: 2,
        not_found_backoff: Duration::from_millis(5),
        redelivery_delay: Duration::from_millis(10),
        poll_interval: Duration::from_millis(10),
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryStore::new());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let pipeline = Pipeline::new(queue.clone(), faults.clone(), store.clone(), config);
        Self {
            queue,
            store,
            faults,
            pipeline,
        }
    }

    /// Persist `count` photos for one fresh batch, as the upload handler does.
    pub fn upload(&self, user_id: Uuid, count: usize) -> Vec<Photo> {
        let batch_id = Uuid::new_v4();
        let photos: Vec<Photo> = (0..count)
            .map(|i| {
                Photo::new(
                    user_id,
                    batch_id,
                    format!("photo_{i}.jpg"),
                    format!("uploads/{batch_id}_{i}.jpg"),
                )
            })
            .collect();
        self.store.insert_photos(&photos);
        photos
    }

    /// Put a result message on the result queue, as an inference worker would.
    pub async fn deliver(&self, result: &EmbeddingResult) {
        self.deliver_raw(&result.encode().unwrap()).await;
    }

    pub async fn deliver_raw(&self, payload: &str) {
        self.queue.publish(RESULTS_QUEUE, payload).await.unwrap();
    }
}

/// Success result for `photo` carrying its batch id.
pub fn embedded(photo: &Photo) -> EmbeddingResult {
    EmbeddingResult {
        version: MESSAGE_VERSION,
        name: photo.name.clone(),
        path: photo.path.clone(),
        user_id: photo.user_id,
        upload_at: photo.upload_at,
        batch_id: Some(photo.batch_id),
        status: ResultStatus::Embedded,
        error: None,
    }
}

/// Failure result for `photo`.
pub fn failed(photo: &Photo, reason: &str) -> EmbeddingResult {
    EmbeddingResult {
        status: ResultStatus::Failed,
        error: Some(reason.to_string()),
        ..embedded(photo)
    }
}

/// Result in the legacy shape: no batch id, only owner and photo identity.
pub fn legacy(photo: &Photo) -> EmbeddingResult {
    EmbeddingResult {
        batch_id: None,
        ..embedded(photo)
    }
}

/// Notification store that fails the next N calls of selected operations
/// with `StoreError::Unavailable`, then behaves like the wrapped store.
pub struct FaultyStore {
    inner: Arc<InMemoryStore>,
    create_failures: AtomicU32,
    record_failures: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            create_failures: AtomicU32::new(0),
            record_failures: AtomicU32::new(0),
        }
    }

    pub fn fail_creates(&self, times: u32) {
        self.create_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_records(&self, times: u32) {
        self.record_failures.store(times, Ordering::SeqCst);
    }

    fn take(budget: &AtomicU32) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl NotificationStore for FaultyStore {
    async fn create_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        if Self::take(&self.create_failures) {
            return Err(StoreError::Unavailable);
        }
        self.inner.create_notification(notification).await
    }

    async fn record_result(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        photo_key: &str,
        outcome: PhotoOutcome,
    ) -> Result<ProgressUpdate, StoreError> {
        if Self::take(&self.record_failures) {
            return Err(StoreError::Unavailable);
        }
        self.inner
            .record_result(user_id, batch_id, photo_key, outcome)
            .await
    }

    async fn set_status(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        status: NotificationStatus,
        message: &str,
    ) -> Result<bool, StoreError> {
        self.inner
            .set_status(user_id, batch_id, status, message)
            .await
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        self.inner.list_notifications(user_id).await
    }

    async fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.inner.mark_read(user_id, ids).await
    }
}
