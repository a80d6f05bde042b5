use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};

use super::error::ApiError;
use super::form::Form;
use super::AppState;
use crate::render::data_url::ImagePayload;
use crate::upstream::{with_rate_limit_retry, EditRequest, UpstreamError};

/// `POST /api/edit-image` with `image` (inline payload) and `prompt`
pub async fn edit_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = Form::read(multipart).await?;
    let (Some(image), Some(prompt)) = (form.text("image"), form.text("prompt")) else {
        return Err(ApiError::bad_request(
            "Missing required fields: image and prompt are required",
        ));
    };

    let payload = ImagePayload::parse(image)
        .ok_or_else(|| ApiError::bad_request("Invalid image data URL format"))?;

    let editor = state.editor.as_ref().ok_or_else(|| {
        ApiError::upstream(
            "Failed to edit image",
            UpstreamError::Misconfigured("image editing service not configured".to_string()),
        )
    })?;

    let request = EditRequest {
        mime_type: payload.mime_type(),
        base64: payload.base64.to_string(),
        prompt: prompt.to_string(),
    };

    let edited = with_rate_limit_retry(&state.retry, || editor.edit(&request))
        .await
        .map_err(|e| ApiError::upstream("Failed to edit image", e))?;

    tracing::info!(mime = %edited.mime_type, bytes = edited.base64.len(), "image edited");
    Ok(Json(json!({ "editedImage": edited.to_data_url() })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use std::sync::Arc;

    const IMAGE: &str = "data:image/png;base64,QUJD";

    #[tokio::test]
    async fn test_returns_edited_image() {
        let mut harness = Harness::new();
        harness.state.editor = Some(Arc::new(StubEditor::default()));

        let (status, body) = harness
            .send(multipart_request(
                "/api/edit-image",
                &[("image", IMAGE), ("prompt", "make it dusk")],
                None,
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["editedImage"], "data:image/png;base64,QUJD-edited");
    }

    #[tokio::test]
    async fn test_missing_fields_and_bad_payloads_are_rejected() {
        let mut harness = Harness::new();
        harness.state.editor = Some(Arc::new(StubEditor::default()));

        let (status, _) = harness
            .send(multipart_request("/api/edit-image", &[("image", IMAGE), ("prompt", "")], None))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = harness
            .send(multipart_request(
                "/api/edit-image",
                &[("image", "/uploaded-a.png"), ("prompt", "fog")],
                None,
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid image data URL format");
    }

    #[tokio::test]
    async fn test_unconfigured_editor_is_server_error() {
        let harness = Harness::new();
        let (status, body) = harness
            .send(multipart_request(
                "/api/edit-image",
                &[("image", IMAGE), ("prompt", "fog")],
                None,
            ))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to edit image");
        assert!(body["details"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_then_reports_429() {
        let mut harness = Harness::new();
        let editor = Arc::new(StubEditor::rate_limited_for(u32::MAX));
        harness.state.editor = Some(editor.clone());
        let started = tokio::time::Instant::now();

        let (status, body) = harness
            .send(multipart_request(
                "/api/edit-image",
                &[("image", IMAGE), ("prompt", "fog")],
                None,
            ))
            .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMIT");
        assert!(body["details"].is_string());
        assert_eq!(editor.calls(), 3);
        assert_eq!(started.elapsed().as_secs(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_rate_limited_attempts() {
        let mut harness = Harness::new();
        let editor = Arc::new(StubEditor::rate_limited_for(2));
        harness.state.editor = Some(editor.clone());
        let started = tokio::time::Instant::now();

        let (status, body) = harness
            .send(multipart_request(
                "/api/edit-image",
                &[("image", IMAGE), ("prompt", "fog")],
                None,
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["editedImage"], "data:image/png;base64,QUJD-edited");
        assert_eq!(editor.calls(), 3);
        assert_eq!(started.elapsed().as_secs(), 6);
    }
}
