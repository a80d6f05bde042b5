use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use std::time::Duration;

use super::{bearer, build_client, SearchRequest, SemanticSearch, UpstreamError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    shot_description: Option<&'a str>,
    reference_image: Option<&'a str>,
    shot_database: &'a str,
}

/// Semantic search service reached over HTTP with a bearer token
pub struct HttpShotSearch {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpShotSearch {
    pub fn new(endpoint: &str, token: &str, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl SemanticSearch for HttpShotSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<serde_json::Value>, UpstreamError> {
        let body = SearchBody {
            shot_description: request.shot_description.as_deref(),
            reference_image: request.reference_image.as_deref(),
            shot_database: &request.shot_database,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, bearer(&self.token))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited(status.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let ids: Vec<serde_json::Value> = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::InvalidResponse(format!("expected an array of shot ids: {e}")))?;
        tracing::debug!(matches = ids.len(), "semantic search answered");
        Ok(ids)
    }
}
