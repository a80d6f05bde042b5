/// Persisted keys and schema upgrades
///
/// The project list was first stored without shots under
/// `lumio_projects_v1`; the current shape lives under `lumio_projects_v2`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::data::{Project, ShotRecord};

pub const SHOTS_KEY: &str = "lumio_shots_v1";
pub const PROJECTS_KEY: &str = "lumio_projects_v2";
pub const LEGACY_PROJECTS_KEY: &str = "lumio_projects_v1";
pub const PRESETS_KEY: &str = "lumio_presets_v1";
pub const CURRENT_PROJECT_KEY: &str = "lumio_current_project";

pub const DEFAULT_PROJECT_ID: &str = "default-project";
pub const DEFAULT_PROJECT_NAME: &str = "My Project";

/// Project as stored by the first schema: no shots, date-only timestamps
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LegacyProject {
    id: String,
    name: String,
    #[serde(default)]
    updated_at: String,
}

/// Upgrade a v1 project list, pulling each project's shots from the shot map
pub fn migrate_legacy_projects(
    raw: &str,
    shots: &BTreeMap<String, Vec<ShotRecord>>,
) -> Result<Vec<Project>, serde_json::Error> {
    let legacy: Vec<LegacyProject> = serde_json::from_str(raw)?;

    Ok(legacy
        .into_iter()
        .map(|old| Project {
            shots: shots
                .get(&old.id)
                .map(|records| records.iter().map(ShotRecord::to_entry).collect())
                .unwrap_or_default(),
            updated_at: parse_legacy_timestamp(&old.updated_at),
            id: old.id,
            name: old.name,
        })
        .collect())
}

/// Accepts RFC 3339 or `YYYY-MM-DD`; anything else becomes "now"
fn parse_legacy_timestamp(value: &str) -> DateTime<Utc> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return ts.with_timezone(&Utc);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

/// The active project id was stored JSON-encoded; accept a bare id as well
pub fn parse_current_project(raw: &str) -> Option<String> {
    match serde_json::from_str::<Option<String>>(raw) {
        Ok(id) => id,
        Err(_) => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    }
}
