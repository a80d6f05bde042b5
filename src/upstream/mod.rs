/// Upstream service clients
///
/// This module handles:
/// - The generative image-edit service (gemini.rs)
/// - The semantic shot-search service (shot_search.rs)
/// - Retrying on rate limits with exponential backoff (retry.rs)

pub mod gemini;
pub mod retry;
pub mod shot_search;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiImageEditor;
pub use retry::{with_rate_limit_retry, RetryPolicy};
pub use shot_search::HttpShotSearch;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response format from upstream: {0}")]
    InvalidResponse(String),

    #[error("No image in response. The model may not support image generation, or the prompt was blocked.")]
    NoImage,

    #[error("upstream misconfigured: {0}")]
    Misconfigured(String),
}

impl UpstreamError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited(_))
    }
}

/// An image plus the instruction to apply to it
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    /// e.g. `image/png`
    pub mime_type: String,
    /// Base64 image body, without the `data:` header
    pub base64: String,
    pub prompt: String,
}

/// The edited image as returned by the service
#[derive(Debug, Clone, PartialEq)]
pub struct EditedImage {
    pub mime_type: String,
    pub base64: String,
}

impl EditedImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Generative image editing
#[async_trait]
pub trait ImageEditor: Send + Sync {
    async fn edit(&self, request: &EditRequest) -> Result<EditedImage, UpstreamError>;
}

/// Query forwarded to the semantic search service
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub shot_description: Option<String>,
    /// Inline payload or URL
    pub reference_image: Option<String>,
    /// Serialized, already size-capped catalog subset
    pub shot_database: String,
}

/// Semantic matching of shots against a description or reference image
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Ids of the matching shots
    async fn search(&self, request: &SearchRequest) -> Result<Vec<serde_json::Value>, UpstreamError>;
}

/// Shared client setup for every upstream
pub(crate) fn build_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// `Authorization: Bearer <token>`
pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
