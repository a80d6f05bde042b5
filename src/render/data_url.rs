/// Inline `data:` URL payloads
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::RenderError;

/// A decoded `data:<mime>;base64,<payload>` URL
#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn parse(input: &str) -> Result<Self, RenderError> {
        let rest = input
            .strip_prefix("data:")
            .ok_or_else(|| RenderError::InvalidDataUrl("missing data: prefix".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| RenderError::InvalidDataUrl("missing payload separator".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| RenderError::InvalidDataUrl("only base64 payloads are supported".to_string()))?;

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| RenderError::InvalidDataUrl(format!("bad base64: {e}")))?;

        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }

    pub fn encode(mime: &str, bytes: &[u8]) -> String {
        format!("data:{mime};base64,{}", STANDARD.encode(bytes))
    }
}

/// An inline image split into its format and base64 body without decoding.
///
/// Matches `^data:image/(\w+);base64,(.+)$`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload<'a> {
    pub format: &'a str,
    pub base64: &'a str,
}

impl<'a> ImagePayload<'a> {
    pub fn parse(input: &'a str) -> Option<Self> {
        let rest = input.strip_prefix("data:image/")?;
        let (format, body) = rest.split_once(";base64,")?;

        let word = |c: char| c.is_ascii_alphanumeric() || c == '_';
        if format.is_empty() || !format.chars().all(word) || body.is_empty() || body.contains('\n') {
            return None;
        }
        Some(Self {
            format,
            base64: body,
        })
    }

    pub fn mime_type(&self) -> String {
        format!("image/{}", self.format)
    }
}
