use serde::{Deserialize, Serialize};

/// A scored hit returned by the inference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSearchResult {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub upload_at: i64,
    pub path: String,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct InferenceSearchResponse {
    #[serde(default)]
    pub results: Vec<InferenceSearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}
