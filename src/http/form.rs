use axum::body::Bytes;
use axum::extract::Multipart;
use std::collections::HashMap;

use super::error::ApiError;

/// An uploaded file part
#[derive(Debug, Clone)]
pub struct FormFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// A fully read multipart form
#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, FormFile>,
}

impl Form {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let malformed = |e: axum::extract::multipart::MultipartError| {
            ApiError::bad_request("Malformed form data").with_details(e.to_string())
        };

        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await.map_err(malformed)?;
                    form.files.insert(name, FormFile { file_name, bytes });
                }
                None => {
                    let text = field.text().await.map_err(malformed)?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    /// A text field; empty values count as absent
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<FormFile> {
        self.files.remove(name)
    }
}
