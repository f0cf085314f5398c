//! Wire schemas for the two embedding queues.
//!
//! Both messages carry a `version` field; payloads written before versioning
//! existed decode as version 1. Anything else is rejected at decode time so a
//! newer producer can never be half-understood by an older consumer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notification::PhotoOutcome;
use super::photo::Photo;

pub const JOBS_QUEUE: &str = "embedding_jobs";
pub const RESULTS_QUEUE: &str = "embedding_results";

pub const MESSAGE_VERSION: u16 = 1;

fn default_version() -> u16 {
    MESSAGE_VERSION
}

/// Backend → worker: embed every photo of one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedJob {
    #[serde(default = "default_version")]
    pub version: u16,
    pub user_id: Uuid,
    pub upload_at: i64,
    pub batch_id: Uuid,
    pub photos: Vec<PhotoRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoRef {
    pub name: String,
    pub path: String,
}

impl EmbedJob {
    /// Job for a batch; the first photo supplies owner, batch and timestamp.
    pub fn from_photos(photos: &[Photo]) -> Option<Self> {
        let first = photos.first()?;
        Some(Self {
            version: MESSAGE_VERSION,
            user_id: first.user_id,
            upload_at: first.upload_at,
            batch_id: first.batch_id,
            photos: photos
                .iter()
                .map(|p| PhotoRef {
                    name: p.name.clone(),
                    path: p.path.clone(),
                })
                .collect(),
        })
    }

    pub fn encode(&self) -> Result<String, MessageError> {
        serde_json::to_string(self).map_err(MessageError::Malformed)
    }

    pub fn decode(payload: &str) -> Result<Self, MessageError> {
        let job: Self = serde_json::from_str(payload).map_err(MessageError::Malformed)?;
        check_version(job.version)?;
        Ok(job)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Embedded,
    Failed,
}

/// Worker → backend: outcome for exactly one photo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingResult {
    #[serde(default = "default_version")]
    pub version: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub upload_at: i64,
    /// Older workers omit this; the batch is then resolved from the photo record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmbeddingResult {
    pub fn decode(payload: &str) -> Result<Self, MessageError> {
        let result: Self = serde_json::from_str(payload).map_err(MessageError::Malformed)?;
        check_version(result.version)?;
        if result.name.is_empty() && result.path.is_empty() {
            return Err(MessageError::MissingPhoto);
        }
        Ok(result)
    }

    pub fn encode(&self) -> Result<String, MessageError> {
        serde_json::to_string(self).map_err(MessageError::Malformed)
    }

    /// Dedup key within a batch. Paths are unique per upload, names are not.
    pub fn photo_key(&self) -> &str {
        if self.path.is_empty() {
            &self.name
        } else {
            &self.path
        }
    }

    pub fn outcome(&self) -> PhotoOutcome {
        match self.status {
            ResultStatus::Embedded => PhotoOutcome::Embedded,
            ResultStatus::Failed => PhotoOutcome::Failed,
        }
    }
}

fn check_version(version: u16) -> Result<(), MessageError> {
    if version == MESSAGE_VERSION {
        Ok(())
    } else {
        Err(MessageError::UnsupportedVersion(version))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported message version {0}")]
    UnsupportedVersion(u16),

    #[error("Result names no photo (empty name and path)")]
    MissingPhoto,
}
