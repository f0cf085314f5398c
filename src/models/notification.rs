use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a batch progress record. `Completed` and `Failed` are terminal.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Completed,
    Failed,
}

impl NotificationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }
}

/// Which counter a single photo result moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PhotoOutcome {
    Embedded,
    Failed,
}

/// Per-batch upload progress, one record per batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub user_id: Uuid,
    pub created_at: i64,
    pub status: NotificationStatus,
    pub total: i32,
    pub completed: i32,
    pub failed: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub read: bool,
}

pub const ALL_EMBEDDED_MESSAGE: &str = "All photos embedded successfully";

impl Notification {
    /// Fresh pending record for a batch of `total` photos.
    pub fn pending(user_id: Uuid, batch_id: Uuid, total: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            user_id,
            created_at: chrono::Utc::now().timestamp(),
            status: NotificationStatus::Pending,
            total,
            completed: 0,
            failed: 0,
            message: None,
            read: false,
        }
    }

    pub fn processed(&self) -> i32 {
        self.completed + self.failed
    }

    /// Terminal status the counters call for, if any.
    ///
    /// `completed >= total` always wins; a batch whose every photo has been
    /// accounted for with at least one failure settles as `Failed`.
    pub fn settled_status(&self) -> Option<(NotificationStatus, String)> {
        if self.completed >= self.total {
            Some((NotificationStatus::Completed, ALL_EMBEDDED_MESSAGE.to_string()))
        } else if self.failed > 0 && self.processed() >= self.total {
            Some((
                NotificationStatus::Failed,
                format!("{} of {} photos failed to embed", self.failed, self.total),
            ))
        } else {
            None
        }
    }
}

/// Body of `POST /api/notifications`.
#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}
