/// Read-only shot catalog
///
/// The catalog is the static film-shot dataset searched by `/api/search`.
/// It is loaded once at startup and never written.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Cap on the serialized subset forwarded to the semantic search service
pub const MAX_SHOT_DATABASE_CHARS: usize = 100_000;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize catalog subset: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One catalog record. Fields other than the filter keys are kept as-is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CatalogShot {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Structured filter; every bound is optional and inclusive
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShotQuery {
    pub shot_size: Option<String>,
    pub start_year: Option<i64>,
    pub end_year: Option<i64>,
}

impl ShotQuery {
    pub fn matches(&self, shot: &CatalogShot) -> bool {
        let size_matches = self
            .shot_size
            .as_deref()
            .map_or(true, |size| shot.shot_size.as_deref() == Some(size));

        let after_start = self
            .start_year
            .map_or(true, |start| shot.year.is_some_and(|year| year >= start));
        let before_end = self
            .end_year
            .map_or(true, |end| shot.year.is_some_and(|year| year <= end));

        size_matches && after_start && before_end
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShotCatalog {
    shots: Vec<CatalogShot>,
}

impl ShotCatalog {
    pub fn new(shots: Vec<CatalogShot>) -> Self {
        Self { shots }
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let shots: Vec<CatalogShot> =
            serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(path = %path.display(), shots = shots.len(), "catalog loaded");
        Ok(Self { shots })
    }

    /// Load the catalog, serving an empty one when the file does not exist
    pub fn load_or_empty(path: &Path) -> Result<Self, CatalogError> {
        match Self::load(path) {
            Err(CatalogError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "catalog file not found, searching an empty catalog");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Shots passing `query`, in catalog order
    pub fn filter(&self, query: &ShotQuery) -> Vec<&CatalogShot> {
        self.shots.iter().filter(|shot| query.matches(shot)).collect()
    }
}

/// Serialize `shots` as a JSON array, cut to at most `max_chars` characters
pub fn serialize_subset(shots: &[&CatalogShot], max_chars: usize) -> Result<String, CatalogError> {
    let json = serde_json::to_string(shots)?;
    match json.char_indices().nth(max_chars) {
        Some((cut, _)) => Ok(json[..cut].to_string()),
        None => Ok(json),
    }
}
