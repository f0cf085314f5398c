use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use super::error::ApiError;
use crate::app_state::AppState;

/// The caller, resolved from the `Authorization` header.
///
/// Accepts `Bearer <token>` as well as a bare token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing token".to_string()))?;

        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        let id = state
            .auth
            .verify_token(token)
            .map_err(|_| ApiError::Unauthorized("invalid token".to_string()))?;

        Ok(Self { id })
    }
}
