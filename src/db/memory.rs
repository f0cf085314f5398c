use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::store::{NotificationStore, PhotoStore, ProgressUpdate, StoreError};
use crate::models::notification::{Notification, NotificationStatus, PhotoOutcome};
use crate::models::photo::Photo;

#[derive(Default)]
struct State {
    notifications: Vec<Notification>,
    counted: HashSet<(Uuid, String)>,
    photos: Vec<Photo>,
}

/// In-memory implementation of both stores (for development/testing).
///
/// One mutex guards everything, which gives `record_result` the same
/// all-or-nothing behavior as the Postgres transaction.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    photo_writes_failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_photos(&self, photos: &[Photo]) {
        self.lock().photos.extend_from_slice(photos);
    }

    pub fn photos(&self) -> Vec<Photo> {
        self.lock().photos.clone()
    }

    pub fn notification(&self, user_id: Uuid, batch_id: Uuid) -> Option<Notification> {
        self.lock()
            .notifications
            .iter()
            .find(|n| n.user_id == user_id && n.batch_id == batch_id)
            .cloned()
    }

    /// Make `mark_embedded` fail, to exercise the photo/progress split.
    pub fn set_photo_writes_failing(&self, failing: bool) {
        self.photo_writes_failing.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn create_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut state = self.lock();
        let exists = state
            .notifications
            .iter()
            .any(|n| n.user_id == notification.user_id && n.batch_id == notification.batch_id);
        if !exists {
            state.notifications.push(notification.clone());
        }
        Ok(())
    }

    async fn record_result(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        photo_key: &str,
        outcome: PhotoOutcome,
    ) -> Result<ProgressUpdate, StoreError> {
        let mut state = self.lock();
        let State {
            notifications,
            counted,
            ..
        } = &mut *state;

        let record = notifications
            .iter_mut()
            .find(|n| n.user_id == user_id && n.batch_id == batch_id)
            .ok_or(StoreError::NotFound { batch_id })?;

        if record.processed() >= record.total {
            return Ok(ProgressUpdate::Saturated(record.clone()));
        }
        if !counted.insert((record.id, photo_key.to_string())) {
            return Ok(ProgressUpdate::Duplicate(record.clone()));
        }

        match outcome {
            PhotoOutcome::Embedded => record.completed += 1,
            PhotoOutcome::Failed => record.failed += 1,
        }
        record.read = false;

        Ok(ProgressUpdate::Applied(record.clone()))
    }

    async fn set_status(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        status: NotificationStatus,
        message: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let record = state.notifications.iter_mut().find(|n| {
            n.user_id == user_id
                && n.batch_id == batch_id
                && n.status == NotificationStatus::Pending
        });

        Ok(match record {
            Some(record) => {
                record.status = status;
                record.message = Some(message.to_string());
                true
            }
            None => false,
        })
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let mut owned: Vec<Notification> = self
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut state = self.lock();
        let mut updated = 0;
        for record in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && ids.contains(&n.id))
        {
            record.read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl PhotoStore for InMemoryStore {
    async fn mark_embedded(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        name: &str,
        path: &str,
    ) -> Result<u64, StoreError> {
        if self.photo_writes_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }

        let mut state = self.lock();
        let mut updated = 0;
        for photo in state.photos.iter_mut().filter(|p| {
            p.user_id == user_id
                && p.batch_id == batch_id
                && (p.path == path || (path.is_empty() && p.name == name))
        }) {
            photo.embedded = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn find_photo(
        &self,
        user_id: Uuid,
        batch_id: Option<Uuid>,
        name: &str,
        path: &str,
    ) -> Result<Option<Photo>, StoreError> {
        Ok(self
            .lock()
            .photos
            .iter()
            .filter(|p| {
                p.user_id == user_id
                    && batch_id.is_none_or(|b| p.batch_id == b)
                    && (p.path == path || (path.is_empty() && p.name == name))
            })
            .max_by_key(|p| p.upload_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_result_counts_each_key_once() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let batch = Uuid::new_v4();
        store
            .create_notification(&Notification::pending(user, batch, 2))
            .await
            .unwrap();

        let first = store
            .record_result(user, batch, "a", PhotoOutcome::Embedded)
            .await
            .unwrap();
        assert!(matches!(first, ProgressUpdate::Applied(ref n) if n.completed == 1));

        let again = store
            .record_result(user, batch, "a", PhotoOutcome::Embedded)
            .await
            .unwrap();
        assert!(matches!(again, ProgressUpdate::Duplicate(ref n) if n.completed == 1));
    }

    #[tokio::test]
    async fn test_record_result_unknown_batch() {
        let store = InMemoryStore::new();
        let err = store
            .record_result(Uuid::new_v4(), Uuid::new_v4(), "a", PhotoOutcome::Embedded)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_set_status_never_leaves_terminal() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let batch = Uuid::new_v4();
        store
            .create_notification(&Notification::pending(user, batch, 1))
            .await
            .unwrap();

        assert!(store
            .set_status(user, batch, NotificationStatus::Completed, "done")
            .await
            .unwrap());
        assert!(!store
            .set_status(user, batch, NotificationStatus::Failed, "late")
            .await
            .unwrap());
        assert_eq!(
            store.notification(user, batch).unwrap().status,
            NotificationStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_find_photo_prefers_latest_upload() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let older = Photo {
            upload_at: 100,
            ..Photo::new(user, Uuid::new_v4(), "cat.jpg", "uploads/1_cat.jpg")
        };
        let newer = Photo {
            upload_at: 200,
            ..Photo::new(user, Uuid::new_v4(), "cat.jpg", "uploads/2_cat.jpg")
        };
        store.insert_photos(&[older.clone(), newer.clone()]);

        let by_name = store.find_photo(user, None, "cat.jpg", "").await.unwrap();
        assert_eq!(by_name, Some(newer.clone()));
        let by_path = store
            .find_photo(user, None, "cat.jpg", "uploads/1_cat.jpg")
            .await
            .unwrap();
        assert_eq!(by_path, Some(older.clone()));
        let in_batch = store
            .find_photo(user, Some(older.batch_id), "cat.jpg", "")
            .await
            .unwrap();
        assert_eq!(in_batch, Some(older));
    }

    #[tokio::test]
    async fn test_create_notification_is_idempotent() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let batch = Uuid::new_v4();
        let first = Notification::pending(user, batch, 2);
        store.create_notification(&first).await.unwrap();
        store
            .create_notification(&Notification::pending(user, batch, 2))
            .await
            .unwrap();

        assert_eq!(store.list_notifications(user).await.unwrap().len(), 1);
        assert_eq!(store.notification(user, batch).unwrap().id, first.id);
    }
}
