//! Cost API client
//!
//! Issues `GET {base}/v2/cost` with an already configured `reqwest::Client`.
//! TLS and authentication are the caller's concern.

use reqwest::header::ACCEPT;
use reqwest::StatusCode;

use crate::protocol::{CostQuery, CostResponse};

/// Path of the cost endpoint, relative to the base URL
pub const COST_PATH: &str = "/v2/cost";

/// Error type for cost API operations
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to decode response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Client for the cost allocation endpoint
#[derive(Debug, Clone)]
pub struct CostClient {
    http: reqwest::Client,
    base_url: String,
}

impl CostClient {
    /// Create a client rooted at `base_url`; a trailing slash is ignored
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the cost endpoint, without query string
    pub fn cost_url(&self) -> String {
        format!("{}{}", self.base_url, COST_PATH)
    }

    /// Query cost allocations and decode the body
    pub async fn query(&self, query: &CostQuery) -> Result<CostResponse> {
        let body = self.query_raw(query).await?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode { source, body })
    }

    /// Query cost allocations and return the body undecoded
    pub async fn query_raw(&self, query: &CostQuery) -> Result<String> {
        let url = self.cost_url();
        tracing::info!("GET {} window={} filter={}", url, query.window, query.filter);
        let start = std::time::Instant::now();

        let response = self
            .http
            .get(&url)
            .query(&query.params())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(
            "cost query returned {} ({} bytes) in {:?}",
            status,
            body.len(),
            start.elapsed()
        );

        if !status.is_success() {
            return Err(ApiError::Status { status, body });
        }
        Ok(body)
    }
}
