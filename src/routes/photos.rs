use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::error::ApiError;
use super::extract::AuthUser;
use crate::app_state::AppState;
use crate::db::photo_queries;
use crate::models::photo::{PageParams, Photo, PhotoPage};
use crate::models::search::{InferenceSearchResult, SearchParams};
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    Queued,
    /// Job published, but batch progress will not be reported.
    Untracked,
    DispatchFailed,
}

/// Response of `POST /api/upload`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub batch_id: Uuid,
    pub uploaded_count: usize,
    pub failed_count: usize,
    pub uploaded: Vec<Photo>,
    pub failed_files: Vec<String>,
    pub embedding_status: EmbeddingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
}

/// POST /api/upload: store a batch of photos and queue them for embedding.
///
/// 200 when the embedding job was published. 207 when the metadata is saved
/// but the job could not be dispatched, or was dispatched without a progress
/// record.
pub async fn upload_photos(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let batch_id = Uuid::new_v4();
    let upload_at = Utc::now().timestamp();
    let mut uploaded = Vec::new();
    let mut failed_files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("photos") {
            continue;
        }
        let name = field.file_name().unwrap_or("photo").to_string();
        let data = field.bytes().await?;

        if image::guess_format(&data).is_err() {
            tracing::debug!(file = %name, "Rejected upload that is not a recognized image");
            failed_files.push(name);
            continue;
        }

        match state.uploads.save(&name, &data).await {
            Ok(path) => uploaded.push(Photo {
                upload_at,
                ..Photo::new(user.id, batch_id, name, path)
            }),
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Failed to store uploaded file");
                failed_files.push(name);
            }
        }
    }

    if uploaded.is_empty() {
        return Err(ApiError::BadRequest("no valid photos uploaded".to_string()));
    }

    photo_queries::insert_photos(&state.db, &uploaded).await?;

    let (status, embedding_status, message, notification_id) =
        match state.producer.submit(&uploaded).await {
            Ok(notification) => (
                StatusCode::OK,
                EmbeddingStatus::Queued,
                "batch upload completed",
                Some(notification.id),
            ),
            Err(e @ PipelineError::Untracked { .. }) => {
                tracing::error!(batch_id = %batch_id, error = %e, "Embedding progress untracked");
                (
                    StatusCode::MULTI_STATUS,
                    EmbeddingStatus::Untracked,
                    "photos queued, progress tracking unavailable",
                    None,
                )
            }
            Err(e) => {
                tracing::error!(batch_id = %batch_id, error = %e, "Embedding dispatch failed");
                (
                    StatusCode::MULTI_STATUS,
                    EmbeddingStatus::DispatchFailed,
                    "photos saved, embedding dispatch failed",
                    None,
                )
            }
        };

    tracing::info!(
        batch_id = %batch_id,
        user_id = %user.id,
        uploaded = uploaded.len(),
        failed = failed_files.len(),
        "Upload batch stored"
    );

    Ok((
        status,
        Json(UploadResponse {
            message: message.to_string(),
            batch_id,
            uploaded_count: uploaded.len(),
            failed_count: failed_files.len(),
            uploaded,
            failed_files,
            embedding_status,
            notification_id,
        }),
    ))
}

/// GET /api/photos?page=&limit=: newest first.
pub async fn list_photos(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<PhotoPage<Photo>>, ApiError> {
    let (page, limit) = params.resolve();
    let offset = (page - 1).saturating_mul(limit);

    let total = photo_queries::count_photos(&state.db, user.id).await?;
    let photos = photo_queries::list_photos(&state.db, user.id, limit, offset).await?;

    Ok(Json(PhotoPage::new(page, limit, photos, total)))
}

/// GET /api/search?q=: free-text search through the inference service.
pub async fn search_photos(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<PhotoPage<InferenceSearchResult>>, ApiError> {
    let query = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("query param `q` is required".to_string()))?;

    let results = state.inference.search_text(user.id, &query).await?;
    Ok(Json(PhotoPage::single(query, results)))
}

/// POST /api/search/image: search by example image (multipart field `image`).
pub async fn search_by_image(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<PhotoPage<InferenceSearchResult>>, ApiError> {
    let mut example: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let name = field.file_name().unwrap_or("query").to_string();
            let data = field.bytes().await?;
            image::guess_format(&data)
                .map_err(|_| ApiError::UnsupportedMedia("unsupported image format".to_string()))?;
            example = Some((name, data.to_vec()));
        }
    }

    let (name, data) = example.ok_or_else(|| {
        ApiError::BadRequest("multipart field `image` is required".to_string())
    })?;

    let results = state.inference.search_image(user.id, data, name.clone()).await?;
    Ok(Json(PhotoPage::single(name, results)))
}
