/// Generative image editing over the `generateContent` REST call
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{bearer, build_client, EditRequest, EditedImage, ImageEditor, UpstreamError};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Longest upstream error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<ReturnedImage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReturnedImage {
    mime_type: String,
    data: String,
}

pub struct GeminiImageEditor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    token: String,
}

impl GeminiImageEditor {
    pub fn new(endpoint: &str, model: &str, token: &str, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl ImageEditor for GeminiImageEditor {
    async fn edit(&self, request: &EditRequest) -> Result<EditedImage, UpstreamError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: &request.mime_type,
                            data: &request.base64,
                        },
                    },
                    RequestPart::Text {
                        text: &request.prompt,
                    },
                ],
            }],
        };

        tracing::debug!(model = %self.model, prompt_len = request.prompt.len(), "requesting image edit");
        let resp = self
            .client
            .post(self.url())
            .header(AUTHORIZATION, bearer(&self.token))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }
        extract_image(&text)
    }
}

/// Map a non-success response; quota exhaustion becomes `RateLimited`
fn classify_failure(status: StatusCode, body: &str) -> UpstreamError {
    let body = truncate(body, MAX_ERROR_BODY);
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        UpstreamError::RateLimited(body)
    } else {
        UpstreamError::Status {
            status: status.as_u16(),
            body,
        }
    }
}

/// First inline image part of the first candidate
fn extract_image(body: &str) -> Result<EditedImage, UpstreamError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

    let parts = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts)
        .ok_or_else(|| UpstreamError::InvalidResponse("missing candidates[0].content.parts".to_string()))?;

    parts
        .into_iter()
        .find_map(|part| part.inline_data)
        .map(|image| EditedImage {
            mime_type: image.mime_type,
            base64: image.data,
        })
        .ok_or(UpstreamError::NoImage)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};

    #[test]
    fn test_extracts_first_inline_part() {
        let body = r#"{"candidates":[{"content":{"parts":[
            {"text":"Here is your image"},
            {"inlineData":{"mimeType":"image/png","data":"QUJD"}}
        ]}}]}"#;

        let image = extract_image(body).unwrap();
        assert_eq!(image.to_data_url(), "data:image/png;base64,QUJD");
    }

    #[test]
    fn test_missing_parts_is_invalid_response() {
        assert!(matches!(
            extract_image(r#"{"candidates":[]}"#),
            Err(UpstreamError::InvalidResponse(_))
        ));
        assert!(matches!(
            extract_image("not json"),
            Err(UpstreamError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_text_only_answer_is_no_image() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"blocked"}]}}]}"#;
        assert!(matches!(extract_image(body), Err(UpstreamError::NoImage)));
    }

    #[test]
    fn test_quota_errors_are_rate_limits() {
        assert!(classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down").is_rate_limited());
        assert!(classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"status":"RESOURCE_EXHAUSTED"}}"#
        )
        .is_rate_limited());
        assert!(matches!(
            classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            UpstreamError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: "AAAA",
                        },
                    },
                    RequestPart::Text { text: "make it dusk" },
                ],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(json["contents"][0]["parts"][1]["text"], "make it dusk");
    }

    #[tokio::test]
    async fn test_edit_against_local_server() {
        async fn generate(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
            assert_eq!(headers["authorization"], "Bearer secret");
            let data = body["contents"][0]["parts"][0]["inlineData"]["data"].clone();
            Json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": data}}]}}]
            }))
        }

        let app = Router::new().route("/v1/models/:call", post(generate));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let editor = GeminiImageEditor::new(
            &format!("http://{addr}/v1/"),
            DEFAULT_MODEL,
            "secret",
            Duration::from_secs(5),
        );
        let edited = editor
            .edit(&EditRequest {
                mime_type: "image/png".to_string(),
                base64: "WFla".to_string(),
                prompt: "add fog".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(edited.base64, "WFla");
    }
}
