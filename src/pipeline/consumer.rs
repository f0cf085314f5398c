use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{bounded, PipelineConfig, PipelineError, ProgressTracker};
use crate::db::{PhotoStore, ProgressUpdate};
use crate::models::messages::{EmbeddingResult, RESULTS_QUEUE};
use crate::models::notification::PhotoOutcome;
use crate::services::queue::{Delivery, MessageQueue};

/// Why a result message was discarded without touching any counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not a valid result payload.
    Decode,
    /// No batch id in the message and no matching photo to infer it from.
    UnknownPhoto,
    /// The batch record never showed up within the retry budget.
    Orphaned,
}

impl DropReason {
    fn as_label(self) -> &'static str {
        match self {
            DropReason::Decode => "decode",
            DropReason::UnknownPhoto => "unknown_photo",
            DropReason::Orphaned => "orphaned",
        }
    }
}

/// What happened to one result message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Moved a batch counter. Acked.
    Counted,
    /// Already counted earlier. Acked.
    Duplicate,
    /// Discarded for good. Acked.
    Dropped(DropReason),
    /// Transient store failure. Put back on the queue after `redelivery_delay`.
    Deferred,
}

/// The photo a result is counted for.
#[derive(Debug, Clone)]
struct Target {
    batch_id: Uuid,
    /// Dedup key: the stored photo's path whenever the record is known.
    key: String,
    name: String,
    path: String,
}

/// Background loop draining `embedding_results` into the progress tracker.
pub struct ResultConsumer {
    queue: Arc<dyn MessageQueue>,
    photos: Arc<dyn PhotoStore>,
    tracker: Arc<ProgressTracker>,
    config: PipelineConfig,
}

impl ResultConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        photos: Arc<dyn PhotoStore>,
        tracker: Arc<ProgressTracker>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            queue,
            photos,
            tracker,
            config,
        }
    }

    /// Consume until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Up to `concurrency` messages are processed at once. A bad message
    /// never stops the loop; losing the broker connection does, and the
    /// error is returned so the process supervisor can restart us.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        let recovered = self.queue.recover(RESULTS_QUEUE).await?;
        if recovered > 0 {
            info!(recovered, queue = RESULTS_QUEUE, "Requeued unacknowledged embedding results");
        }

        info!(
            queue = RESULTS_QUEUE,
            concurrency = self.config.concurrency,
            "Embedding result consumer started"
        );

        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut in_flight: JoinSet<Disposition> = JoinSet::new();

        let outcome = loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping result consumer");
                break Ok(());
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Result handler task panicked");
                }
            }

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    continue;
                }
            };

            match self.queue.reserve(RESULTS_QUEUE).await {
                Ok(Some(delivery)) => {
                    let this = Arc::clone(&self);
                    in_flight.spawn(async move {
                        let _permit = permit;
                        this.process(delivery).await
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break Ok(());
                            }
                        }
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) if e.is_connection_loss() => {
                    error!(error = %e, "Lost connection to the result queue");
                    break Err(PipelineError::Transport(e));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to reserve embedding result, retrying");
                    drop(permit);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        };

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Result handler task panicked");
            }
        }

        info!("Embedding result consumer stopped");
        outcome
    }

    /// Handle one delivery, then acknowledge it. A deferred delivery is
    /// published again before the ack so it is never lost.
    pub async fn process(&self, delivery: Delivery) -> Disposition {
        let disposition = self.handle(&delivery.payload).await;

        if disposition == Disposition::Deferred && !self.redeliver(&delivery).await {
            // Stays in the processing list until the next `recover`.
            return disposition;
        }

        if let Err(e) = bounded(
            "ack result",
            self.config.operation_timeout,
            self.queue.ack(&delivery),
        )
        .await
        {
            // Not acked means redelivered later, which the dedup set absorbs.
            warn!(error = %e, "Failed to acknowledge embedding result");
        }

        disposition
    }

    async fn redeliver(&self, delivery: &Delivery) -> bool {
        tokio::time::sleep(self.config.redelivery_delay).await;

        match bounded(
            "requeue result",
            self.config.operation_timeout,
            self.queue.publish(&delivery.queue, &delivery.payload),
        )
        .await
        {
            Ok(()) => {
                metrics::counter!("embedding_results_redelivered_total").increment(1);
                debug!(queue = %delivery.queue, "Embedding result requeued after store failure");
                true
            }
            Err(e) => {
                warn!(
                    queue = %delivery.queue,
                    error = %e,
                    "Failed to requeue embedding result, leaving it unacknowledged"
                );
                false
            }
        }
    }

    /// Decode a raw payload and apply it.
    pub async fn handle(&self, payload: &str) -> Disposition {
        metrics::counter!("embedding_results_received_total").increment(1);

        let result = match EmbeddingResult::decode(payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable embedding result");
                return dropped(DropReason::Decode);
            }
        };

        let target = match self.locate(&result).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!(
                    user_id = %result.user_id,
                    photo = %result.photo_key(),
                    "No photo matches embedding result, dropping"
                );
                return dropped(DropReason::UnknownPhoto);
            }
            Err(e) => {
                error!(
                    error = %e,
                    photo = %result.photo_key(),
                    "Failed to look up photo for result"
                );
                return Disposition::Deferred;
            }
        };

        if result.outcome() == PhotoOutcome::Failed {
            warn!(
                batch_id = %target.batch_id,
                photo = %target.key,
                error = result.error.as_deref().unwrap_or("unspecified"),
                "Worker reported embedding failure"
            );
        }

        let disposition = match self.record_with_retry(&result, &target).await {
            Ok(ProgressUpdate::Applied(_)) => Disposition::Counted,
            Ok(_) => Disposition::Duplicate,
            Err(PipelineError::NotFound { .. }) => {
                error!(
                    batch_id = %target.batch_id,
                    user_id = %result.user_id,
                    photo = %target.key,
                    "Orphaned embedding result: batch record never appeared"
                );
                dropped(DropReason::Orphaned)
            }
            Err(e) => {
                error!(
                    batch_id = %target.batch_id,
                    error = %e,
                    "Failed to record embedding result"
                );
                return Disposition::Deferred;
            }
        };

        if result.outcome() == PhotoOutcome::Embedded {
            self.mark_embedded(result.user_id, &target).await;
        }

        disposition
    }

    /// Resolve the stored photo behind a result. Without a record, a result
    /// that names its batch is still counted under its own path or name.
    async fn locate(&self, result: &EmbeddingResult) -> Result<Option<Target>, PipelineError> {
        let photo = bounded(
            "find photo",
            self.config.operation_timeout,
            self.photos
                .find_photo(result.user_id, result.batch_id, &result.name, &result.path),
        )
        .await?;

        Ok(match (photo, result.batch_id) {
            (Some(photo), _) => Some(Target {
                batch_id: photo.batch_id,
                key: photo.path.clone(),
                name: photo.name,
                path: photo.path,
            }),
            (None, Some(batch_id)) => Some(Target {
                batch_id,
                key: result.photo_key().to_string(),
                name: result.name.clone(),
                path: result.path.clone(),
            }),
            (None, None) => None,
        })
    }

    /// The record may lag the job by a moment; retry a few times with backoff.
    async fn record_with_retry(
        &self,
        result: &EmbeddingResult,
        target: &Target,
    ) -> Result<ProgressUpdate, PipelineError> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .tracker
                .record_photo_result(result.user_id, target.batch_id, &target.key, result.outcome())
                .await
            {
                Err(PipelineError::NotFound { .. }) if attempt < self.config.not_found_retries => {
                    let delay = backoff(self.config.not_found_backoff, attempt);
                    attempt += 1;
                    debug!(
                        batch_id = %target.batch_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Batch record not found yet, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Photo flag update. Independent of the counter; failures are only logged.
    async fn mark_embedded(&self, user_id: Uuid, target: &Target) {
        match bounded(
            "mark photo embedded",
            self.config.operation_timeout,
            self.photos
                .mark_embedded(user_id, target.batch_id, &target.name, &target.path),
        )
        .await
        {
            Ok(0) => warn!(
                batch_id = %target.batch_id,
                photo = %target.key,
                "Embedding result matched no photo record"
            ),
            Ok(_) => debug!(
                batch_id = %target.batch_id,
                photo = %target.key,
                "Photo marked embedded"
            ),
            Err(e) => warn!(
                batch_id = %target.batch_id,
                photo = %target.key,
                error = %e,
                "Embedded flag not set for photo"
            ),
        }
    }
}

fn dropped(reason: DropReason) -> Disposition {
    metrics::counter!("embedding_results_dropped_total", "reason" => reason.as_label())
        .increment(1);
    Disposition::Dropped(reason)
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 0), Duration::from_millis(100));
        assert_eq!(backoff(base, 1), Duration::from_millis(200));
        assert_eq!(backoff(base, 3), Duration::from_millis(800));
    }

    #[test]
    fn test_drop_reason_labels() {
        assert_eq!(DropReason::Decode.as_label(), "decode");
        assert_eq!(DropReason::Orphaned.as_label(), "orphaned");
    }
}
