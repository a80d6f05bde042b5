use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::catalog::CatalogError;
use crate::state::{LibraryError, StorageError};
use crate::upstream::UpstreamError;

pub const RATE_LIMIT_CODE: &str = "RATE_LIMIT";
pub const STORAGE_FULL_CODE: &str = "STORAGE_FULL";

/// JSON error answer: `{error, code?, details?}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    code: Option<&'static str>,
    details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            code: None,
            details: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map an upstream failure; `context` names the action for generic errors
    pub fn upstream(context: &str, err: UpstreamError) -> Self {
        match err {
            UpstreamError::RateLimited(_) => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. The upstream service is temporarily unavailable. Please wait a few minutes and try again.",
            )
            .with_code(RATE_LIMIT_CODE)
            .with_details(err.to_string()),
            _ => Self::internal(context).with_details(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.error, details = ?self.details, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.error, "request rejected");
        }

        let body = ErrorBody {
            error: &self.error,
            code: self.code,
            details: self.details.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        let status = match &err {
            LibraryError::NoProjectSelected
            | LibraryError::EmptyProjectName
            | LibraryError::EmptyPresetName => StatusCode::BAD_REQUEST,
            LibraryError::ProjectNotFound(_)
            | LibraryError::ShotNotFound(_)
            | LibraryError::PresetNotFound(_) => StatusCode::NOT_FOUND,
            LibraryError::DuplicateProjectName(_)
            | LibraryError::FiltersAlreadyBaked(_)
            | LibraryError::PresetNotDeletable(_) => StatusCode::CONFLICT,
            LibraryError::MetadataNotSaved(_)
            | LibraryError::Storage(StorageError::QuotaExceeded { .. })
            | LibraryError::Storage(StorageError::WouldExceedQuota { .. }) => {
                return Self::new(StatusCode::INSUFFICIENT_STORAGE, err.to_string())
                    .with_code(STORAGE_FULL_CODE);
            }
            LibraryError::Storage(_) | LibraryError::Corrupt { .. } | LibraryError::Serialize(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        Self::internal("Shot catalog unavailable").with_details(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal("Failed to encode response").with_details(err.to_string())
    }
}
