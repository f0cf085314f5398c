use serde::Deserialize;
use std::time::Duration;

use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080"). Unused by the worker binary.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the embedding queues
    pub redis_url: String,

    /// Base URL of the inference service
    #[serde(default = "default_inference_url")]
    pub inference_url: String,

    /// HMAC secret used to sign bearer tokens
    pub jwt_secret: String,

    /// Directory uploaded photos are written to and served from
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Maximum number of result messages processed at once
    #[serde(default = "default_consumer_concurrency")]
    pub consumer_concurrency: usize,

    /// Upper bound for a single publish or store write
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// How many times a result for an unknown batch is retried
    #[serde(default = "default_not_found_retries")]
    pub not_found_retries: u32,

    /// Base delay between those retries, doubled on each attempt
    #[serde(default = "default_not_found_backoff_ms")]
    pub not_found_backoff_ms: u64,

    /// Delay before a result that hit a store failure is put back on the queue
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,

    /// Consumer sleep when the result queue is empty
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Allowed browser origin, "*" for any
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_inference_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_consumer_concurrency() -> usize {
    4
}

fn default_operation_timeout_secs() -> u64 {
    5
}

fn default_not_found_retries() -> u32 {
    3
}

fn default_not_found_backoff_ms() -> u64 {
    200
}

fn default_redelivery_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
            concurrency: self.consumer_concurrency.max(1),
            not_found_retries: self.not_found_retries,
            not_found_backoff: Duration::from_millis(self.not_found_backoff_ms),
            redelivery_delay: Duration::from_millis(self.redelivery_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
