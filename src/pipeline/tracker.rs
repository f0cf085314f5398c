use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{bounded, PipelineConfig, PipelineError};
use crate::db::{NotificationStore, ProgressUpdate};
use crate::models::notification::{Notification, NotificationStatus, PhotoOutcome};

/// Per-batch progress state machine: `pending → completed | failed`.
///
/// Counting goes through the store's atomic `record_result`; this type only
/// decides when the counters settle the batch and writes the terminal status.
pub struct ProgressTracker {
    store: Arc<dyn NotificationStore>,
    timeout: Duration,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn NotificationStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            timeout: config.operation_timeout,
        }
    }

    /// Count a successfully embedded photo.
    pub async fn record_photo_completion(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        photo_key: &str,
    ) -> Result<ProgressUpdate, PipelineError> {
        self.record_photo_result(user_id, batch_id, photo_key, PhotoOutcome::Embedded)
            .await
    }

    /// Count one photo outcome and settle the batch if it is now fully accounted for.
    ///
    /// Redelivered results come back as `Duplicate` and leave the counters
    /// untouched. They still re-check the terminal status, so a crash between
    /// the increment and the status write heals on the next delivery.
    pub async fn record_photo_result(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        photo_key: &str,
        outcome: PhotoOutcome,
    ) -> Result<ProgressUpdate, PipelineError> {
        let update = bounded(
            "record photo result",
            self.timeout,
            self.store.record_result(user_id, batch_id, photo_key, outcome),
        )
        .await?;

        match update {
            ProgressUpdate::Applied(record) => {
                tracing::debug!(
                    batch_id = %batch_id,
                    photo = photo_key,
                    completed = record.completed,
                    failed = record.failed,
                    total = record.total,
                    "Batch progress updated"
                );
                Ok(ProgressUpdate::Applied(self.settle(record).await?))
            }
            ProgressUpdate::Duplicate(record) => {
                metrics::counter!("embedding_results_duplicate_total").increment(1);
                tracing::info!(
                    batch_id = %batch_id,
                    photo = photo_key,
                    "Ignoring result already counted for batch"
                );
                Ok(ProgressUpdate::Duplicate(self.settle(record).await?))
            }
            ProgressUpdate::Saturated(record) => {
                metrics::counter!("embedding_results_duplicate_total").increment(1);
                tracing::warn!(
                    batch_id = %batch_id,
                    photo = photo_key,
                    total = record.total,
                    "Result arrived for a batch with every photo accounted for"
                );
                Ok(ProgressUpdate::Saturated(self.settle(record).await?))
            }
        }
    }

    /// Write the terminal status the counters call for. Idempotent.
    async fn settle(&self, mut record: Notification) -> Result<Notification, PipelineError> {
        if record.status.is_terminal() {
            return Ok(record);
        }
        let Some((status, message)) = record.settled_status() else {
            return Ok(record);
        };

        let changed = bounded(
            "set batch status",
            self.timeout,
            self.store
                .set_status(record.user_id, record.batch_id, status, &message),
        )
        .await?;

        if changed {
            metrics::counter!("embedding_batches_finished_total", "status" => status.to_string())
                .increment(1);
            match status {
                NotificationStatus::Failed => tracing::warn!(
                    batch_id = %record.batch_id,
                    failed = record.failed,
                    total = record.total,
                    "Batch finished with failures"
                ),
                _ => tracing::info!(
                    batch_id = %record.batch_id,
                    total = record.total,
                    "Batch fully embedded"
                ),
            }
        }

        record.status = status;
        record.message = Some(message);
        Ok(record)
    }
}
