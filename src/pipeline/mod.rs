//! Asynchronous embedding pipeline.
//!
//! ```text
//! upload ─▶ EmbeddingProducer ─▶ embedding_jobs ─▶ (inference workers)
//!                                                        │
//! Notification ◀─ ProgressTracker ◀─ ResultConsumer ◀─ embedding_results
//! ```
//!
//! The producer publishes one job per batch and then creates the batch's
//! progress record. The consumer runs for the lifetime of the process and
//! feeds every result into the tracker, which counts each photo at most once
//! and settles the batch status when the counters say so.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::{NotificationStore, PhotoStore, StoreError};
use crate::models::messages::MessageError;
use crate::services::queue::{MessageQueue, QueueError};

pub mod consumer;
pub mod producer;
pub mod tracker;

pub use consumer::{Disposition, DropReason, ResultConsumer};
pub use producer::EmbeddingProducer;
pub use tracker::ProgressTracker;

/// Tunables shared by producer, consumer and tracker.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub operation_timeout: Duration,
    pub concurrency: usize,
    pub not_found_retries: u32,
    pub not_found_backoff: Duration,
    pub redelivery_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            concurrency: 4,
            not_found_retries: 3,
            not_found_backoff: Duration::from_millis(200),
            redelivery_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// The three pipeline components wired to one set of connection handles.
pub struct Pipeline {
    pub producer: Arc<EmbeddingProducer>,
    pub tracker: Arc<ProgressTracker>,
    pub consumer: Arc<ResultConsumer>,
}

impl Pipeline {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        notifications: Arc<dyn NotificationStore>,
        photos: Arc<dyn PhotoStore>,
        config: PipelineConfig,
    ) -> Self {
        let producer = Arc::new(EmbeddingProducer::new(
            queue.clone(),
            notifications.clone(),
            &config,
        ));
        let tracker = Arc::new(ProgressTracker::new(notifications, &config));
        let consumer = Arc::new(ResultConsumer::new(queue, photos, tracker.clone(), config));

        Self {
            producer,
            tracker,
            consumer,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid batch: {0}")]
    Validation(String),

    #[error("Embedding dispatch failed: {0}")]
    Dispatch(String),

    /// The job was published but its progress record could not be written.
    #[error("Job for batch {batch_id} published without a progress record: {reason}")]
    Untracked { batch_id: Uuid, reason: String },

    #[error("Undecodable message: {0}")]
    Decode(#[from] MessageError),

    #[error("No progress record for batch {batch_id}")]
    NotFound { batch_id: Uuid },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Queue transport error: {0}")]
    Transport(#[from] QueueError),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { batch_id } => PipelineError::NotFound { batch_id },
            other => PipelineError::Store(other),
        }
    }
}

/// Run a store or broker call, failing instead of hanging past `limit`.
pub(crate) async fn bounded<T, E, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, E>>,
    PipelineError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(PipelineError::from),
        Err(_) => Err(PipelineError::Timeout {
            operation,
            after: limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), PipelineError> = bounded(
            "slow write",
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), StoreError>(())
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(PipelineError::Timeout { operation: "slow write", .. })
        ));
    }

    #[test]
    fn test_store_not_found_maps_to_pipeline_not_found() {
        let batch_id = Uuid::new_v4();
        let err = PipelineError::from(StoreError::NotFound { batch_id });
        assert!(matches!(err, PipelineError::NotFound { batch_id: b } if b == batch_id));
    }
}
