use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::models::search::{InferenceSearchResponse, InferenceSearchResult};

const SEARCH_TIMEOUT_SECS: u64 = 30;

/// Client for the external inference service's search endpoints.
pub struct InferenceClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct TextSearchRequest<'a> {
    text: &'a str,
    user_id: String,
}

impl InferenceClient {
    pub fn new(base_url: &str) -> Result<Self, InferenceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .map_err(InferenceError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Rank the owner's photos against a free-text query.
    pub async fn search_text(
        &self,
        user_id: Uuid,
        text: &str,
    ) -> Result<Vec<InferenceSearchResult>, InferenceError> {
        let url = format!("{}/embed/text", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&TextSearchRequest {
                text,
                user_id: user_id.to_string(),
            })
            .send()
            .await
            .map_err(InferenceError::Http)?;

        Self::parse_results(response).await
    }

    /// Rank the owner's photos by similarity to an example image.
    pub async fn search_image(
        &self,
        user_id: Uuid,
        image: Vec<u8>,
        file_name: String,
    ) -> Result<Vec<InferenceSearchResult>, InferenceError> {
        let url = format!("{}/search/image", self.base_url);
        let form = Form::new()
            .text("user_id", user_id.to_string())
            .part("file", Part::bytes(image).file_name(file_name));

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(InferenceError::Http)?;

        Self::parse_results(response).await
    }

    async fn parse_results(
        response: reqwest::Response,
    ) -> Result<Vec<InferenceSearchResult>, InferenceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: InferenceSearchResponse = response.json().await.map_err(InferenceError::Http)?;
        Ok(parsed.results)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference service returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = InferenceClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_search_response_tolerates_missing_results() {
        let parsed: InferenceSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
