use std::sync::Arc;
use std::time::Duration;

use super::{bounded, PipelineConfig, PipelineError};
use crate::db::NotificationStore;
use crate::models::messages::{EmbedJob, JOBS_QUEUE};
use crate::models::notification::Notification;
use crate::models::photo::Photo;
use crate::services::queue::MessageQueue;

/// Tries at creating the progress record once the job is out.
const CREATE_ATTEMPTS: u32 = 3;

/// Turns a freshly persisted upload batch into one embedding job.
pub struct EmbeddingProducer {
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn NotificationStore>,
    timeout: Duration,
    retry_backoff: Duration,
}

impl EmbeddingProducer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn NotificationStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            queue,
            store,
            timeout: config.operation_timeout,
            retry_backoff: config.not_found_backoff,
        }
    }

    /// Publish the batch's job, then create its pending progress record.
    ///
    /// Every photo must share one batch id and owner. If the publish fails no
    /// record is created and the caller gets `PipelineError::Dispatch`. If the
    /// job went out but the record could not be created, the caller gets
    /// `PipelineError::Untracked`: photos still get embedded, progress is lost.
    pub async fn submit(&self, photos: &[Photo]) -> Result<Notification, PipelineError> {
        let job = EmbedJob::from_photos(photos)
            .ok_or_else(|| PipelineError::Validation("cannot dispatch an empty batch".into()))?;

        if photos
            .iter()
            .any(|p| p.batch_id != job.batch_id || p.user_id != job.user_id)
        {
            return Err(PipelineError::Validation(
                "photos span more than one batch or owner".into(),
            ));
        }

        let total = i32::try_from(photos.len())
            .map_err(|_| PipelineError::Validation("batch too large".into()))?;
        let payload = job.encode()?;

        let published =
            tokio::time::timeout(self.timeout, self.queue.publish(JOBS_QUEUE, &payload)).await;
        let failure = match published {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("publish timed out after {:?}", self.timeout)),
        };
        if let Some(reason) = failure {
            metrics::counter!("embedding_jobs_dispatch_failed_total").increment(1);
            tracing::warn!(
                batch_id = %job.batch_id,
                user_id = %job.user_id,
                error = %reason,
                "Failed to publish embedding job"
            );
            return Err(PipelineError::Dispatch(reason));
        }
        metrics::counter!("embedding_jobs_published_total").increment(1);

        let notification = Notification::pending(job.user_id, job.batch_id, total);
        self.create_record(&notification).await?;

        tracing::info!(
            batch_id = %job.batch_id,
            user_id = %job.user_id,
            photos = total,
            "Embedding job published"
        );

        Ok(notification)
    }

    /// Creation is idempotent, so a retry after an ambiguous failure is safe.
    async fn create_record(&self, notification: &Notification) -> Result<(), PipelineError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match bounded(
                "create notification",
                self.timeout,
                self.store.create_notification(notification),
            )
            .await
            {
                Ok(()) => return Ok(()),
                Err(e) if attempt < CREATE_ATTEMPTS => {
                    tracing::warn!(
                        batch_id = %notification.batch_id,
                        attempt,
                        error = %e,
                        "Failed to create progress record, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff.saturating_mul(attempt)).await;
                }
                Err(e) => {
                    metrics::counter!("embedding_jobs_untracked_total").increment(1);
                    tracing::error!(
                        batch_id = %notification.batch_id,
                        user_id = %notification.user_id,
                        error = %e,
                        "Embedding job published without a progress record"
                    );
                    return Err(PipelineError::Untracked {
                        batch_id: notification.batch_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
