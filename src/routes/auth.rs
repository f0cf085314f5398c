use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde_json::{json, Value};

use super::error::ApiError;
use crate::app_state::AppState;
use crate::db::user_queries;
use crate::models::user::{LoginRequest, LoginResponse, RegisterRequest};

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    input.validate()?;

    let hash = state.auth.hash_password(&input.password).await?;
    let user = user_queries::create_user(&state.db, &input.name, &input.email, &hash)
        .await?
        .ok_or_else(|| ApiError::Conflict("email already in use".to_string()))?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(json!({ "message": "registered" }))))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    input.validate()?;

    let user = user_queries::find_by_email(&state.db, &input.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid credentials".to_string()))?;

    let valid = state
        .auth
        .verify_password(&input.password, &user.password_hash)
        .await?;
    if !valid {
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    let token = state.auth.issue_token(user.id)?;
    Ok(Json(LoginResponse {
        token,
        name: user.name,
    }))
}
