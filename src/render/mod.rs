/// Image rendering module
///
/// This module handles:
/// - Parsing and encoding inline `data:` payloads (data_url.rs)
/// - Baking slider adjustments into pixels (filters.rs)
/// - The CSS-filter SVG wrapper used when pixels are unavailable (svg.rs)
/// - Loading a shot's source image from inline data, the public
///   directory or a remote URL (this file)

pub mod data_url;
pub mod filters;
pub mod svg;

use async_trait::async_trait;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::state::data::is_inline;
use crate::state::edit::FilterValues;
use data_url::DataUrl;

pub use svg::svg_filter_fallback;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("refusing to read outside the public directory: {0}")]
    OutsidePublicDir(String),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("render task failed: {0}")]
    Join(String),
}

/// Renders a source image with adjustments baked in
#[async_trait]
pub trait FilterRenderer: Send + Sync {
    /// Returns an inline PNG payload of `source` with `filters` applied
    async fn render(&self, source: &str, filters: &FilterValues) -> Result<String, RenderError>;
}

/// Render through `renderer`, falling back to the CSS-filter SVG wrapper
pub async fn render_or_fallback(
    renderer: &dyn FilterRenderer,
    source: &str,
    filters: &FilterValues,
) -> String {
    match renderer.render(source, filters).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "pixel render failed, storing CSS-filter wrapper");
            svg_filter_fallback(source, filters)
        }
    }
}

/// Decodes the source with the `image` crate and filters it on the CPU
pub struct PixelRenderer {
    public_dir: PathBuf,
    client: reqwest::Client,
}

impl PixelRenderer {
    pub fn new(public_dir: PathBuf, fetch_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { public_dir, client }
    }

    /// Raw bytes of a reference: inline payload, remote URL or public path
    async fn load_bytes(&self, source: &str) -> Result<Vec<u8>, RenderError> {
        if is_inline(source) {
            return Ok(DataUrl::parse(source)?.bytes);
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            let fetch_err = |reason: String| RenderError::Fetch {
                url: source.to_string(),
                reason,
            };
            let resp = self
                .client
                .get(source)
                .send()
                .await
                .map_err(|e| fetch_err(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(fetch_err(format!("status {}", resp.status())));
            }
            let bytes = resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
            return Ok(bytes.to_vec());
        }

        let path = resolve_public_path(&self.public_dir, source)?;
        tokio::fs::read(&path).await.map_err(|e| RenderError::Fetch {
            url: source.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl FilterRenderer for PixelRenderer {
    async fn render(&self, source: &str, filters: &FilterValues) -> Result<String, RenderError> {
        let bytes = self.load_bytes(source).await?;
        let filters = *filters;

        // Spawn blocking for CPU-bound decode, filter and encode
        tokio::task::spawn_blocking(move || render_bytes(&bytes, &filters))
            .await
            .map_err(|e| RenderError::Join(e.to_string()))?
    }
}

/// Decode, filter and re-encode as a PNG data URL
pub fn render_bytes(bytes: &[u8], filters: &FilterValues) -> Result<String, RenderError> {
    let mut image = image::load_from_memory(bytes)
        .map_err(RenderError::Decode)?
        .to_rgba8();

    filters::apply_filters(&mut image, filters);

    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(RenderError::Encode)?;

    tracing::debug!(
        width = image.width(),
        height = image.height(),
        bytes = encoded.get_ref().len(),
        "rendered filtered image"
    );
    Ok(DataUrl::encode("image/png", encoded.get_ref()))
}

/// Map a site-relative reference such as `/uploaded-a.png` into `public_dir`
fn resolve_public_path(public_dir: &Path, reference: &str) -> Result<PathBuf, RenderError> {
    let relative = Path::new(reference.trim_start_matches('/'));
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || reference.is_empty() {
        return Err(RenderError::OutsidePublicDir(reference.to_string()));
    }
    Ok(public_dir.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(8, 8, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn decode_png(payload: &str) -> RgbaImage {
        let data = DataUrl::parse(payload).unwrap();
        assert_eq!(data.mime, "image/png");
        image::load_from_memory(&data.bytes).unwrap().to_rgba8()
    }

    #[tokio::test]
    async fn test_renders_inline_payload() {
        let renderer = PixelRenderer::new(PathBuf::from("public"), Duration::from_secs(1));
        let source = DataUrl::encode("image/png", &png_bytes([100, 100, 100, 255]));

        let payload = renderer
            .render(&source, &FilterValues::new(150.0, 100.0, 0.0))
            .await
            .unwrap();

        assert_eq!(decode_png(&payload).get_pixel(4, 4), &Rgba([150, 150, 150, 255]));
    }

    #[tokio::test]
    async fn test_renders_file_from_public_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uploaded-a.png"), png_bytes([40, 80, 120, 255])).unwrap();
        let renderer = PixelRenderer::new(dir.path().to_path_buf(), Duration::from_secs(1));

        let payload = renderer
            .render("/uploaded-a.png", &FilterValues::default())
            .await
            .unwrap();

        assert_eq!(decode_png(&payload).get_pixel(0, 0), &Rgba([40, 80, 120, 255]));
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_public_dir() {
        let renderer = PixelRenderer::new(PathBuf::from("public"), Duration::from_secs(1));
        let err = renderer
            .render("/../secret.png", &FilterValues::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::OutsidePublicDir(_)));
    }

    #[tokio::test]
    async fn test_undecodable_source_falls_back_to_svg() {
        let renderer = PixelRenderer::new(PathBuf::from("public"), Duration::from_secs(1));
        let source = DataUrl::encode("image/png", b"not an image");

        let payload =
            render_or_fallback(&renderer, &source, &FilterValues::new(90.0, 100.0, 30.0)).await;

        assert!(payload.starts_with("data:image/svg+xml;base64,"));
    }
}
