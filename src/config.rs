/// Runtime configuration read from `LUMIO_*` environment variables
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::upstream::gemini::DEFAULT_MODEL;

pub const DEFAULT_BIND: ([u8; 4], u16) = ([127, 0, 0, 1], 3000);
/// Matches the ceiling browsers place on local storage
pub const DEFAULT_STORAGE_QUOTA_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("no data directory available; set LUMIO_DATA_DIR")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEditConfig {
    pub endpoint: String,
    pub token: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShotSearchConfig {
    pub endpoint: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub storage_quota_bytes: usize,
    pub public_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub max_body_bytes: usize,
    /// Present only when both endpoint and token are set
    pub image_edit: Option<ImageEditConfig>,
    pub shot_search: Option<ShotSearchConfig>,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = env_parse(
            "LUMIO_BIND",
            var("LUMIO_BIND"),
            SocketAddr::from(DEFAULT_BIND),
            "a socket address",
        )?;

        let data_dir = match var("LUMIO_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|dir| dir.join("lumio"))
                .ok_or(ConfigError::NoDataDir)?,
        };

        let image_edit = match (var("LUMIO_IMAGE_EDIT_URL"), var("LUMIO_IMAGE_EDIT_TOKEN")) {
            (Some(endpoint), Some(token)) => Some(ImageEditConfig {
                endpoint,
                token,
                model: var("LUMIO_IMAGE_EDIT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            }),
            _ => None,
        };

        let shot_search = match (var("LUMIO_SHOT_SEARCH_URL"), var("LUMIO_SHOT_SEARCH_TOKEN")) {
            (Some(endpoint), Some(token)) => Some(ShotSearchConfig { endpoint, token }),
            _ => None,
        };

        Ok(Self {
            bind,
            data_dir,
            storage_quota_bytes: env_parse(
                "LUMIO_STORAGE_QUOTA_BYTES",
                var("LUMIO_STORAGE_QUOTA_BYTES"),
                DEFAULT_STORAGE_QUOTA_BYTES,
                "a byte count",
            )?,
            public_dir: var("LUMIO_PUBLIC_DIR").map_or_else(|| PathBuf::from("public"), PathBuf::from),
            catalog_path: var("LUMIO_CATALOG_PATH")
                .map_or_else(|| PathBuf::from("shot-database/metadata.json"), PathBuf::from),
            max_body_bytes: env_parse(
                "LUMIO_MAX_BODY_BYTES",
                var("LUMIO_MAX_BODY_BYTES"),
                DEFAULT_MAX_BODY_BYTES,
                "a byte count",
            )?,
            image_edit,
            shot_search,
            upstream_timeout: Duration::from_secs(env_parse(
                "LUMIO_UPSTREAM_TIMEOUT_SECS",
                var("LUMIO_UPSTREAM_TIMEOUT_SECS"),
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
                "a number of seconds",
            )?),
        })
    }

    /// Location of the SQLite store inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("lumio.db")
    }
}

fn env_parse<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value, expected }),
    }
}
