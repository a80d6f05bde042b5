/// Shared data structures for the application state
///
/// These structs represent the data model persisted by the library
/// and returned by the HTTP layer. Field names serialize in camelCase
/// to stay compatible with previously stored browser data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::edit::FilterValues;

/// Prefix shared by every inline-encoded image payload
pub const INLINE_PREFIX: &str = "data:";

/// Whether a reference is an inline payload rather than a path or URL
pub fn is_inline(reference: &str) -> bool {
    reference.starts_with(INLINE_PREFIX)
}

/// A full shot as stored in the shot map
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShotRecord {
    pub id: String,
    /// The original, never-edited reference
    #[serde(default)]
    pub url: String,
    /// Current display payload
    #[serde(default)]
    pub image_url: String,
    /// Adjustments applied at view time. Only present on non-inline images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterValues>,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// How a stored shot must be drawn
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPlan<'a> {
    /// The image already carries its adjustments
    Baked(&'a str),
    /// The image must be drawn with these adjustments on top
    ApplyFilters(&'a str, FilterValues),
}

impl ShotRecord {
    /// A fresh shot whose current image is its original reference
    pub fn new(reference: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: reference.to_string(),
            image_url: reference.to_string(),
            filters: None,
            title: String::new(),
            year: String::new(),
            notes: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// The image to display, falling back to the original reference
    pub fn display_image(&self) -> &str {
        if self.image_url.is_empty() {
            &self.url
        } else {
            &self.image_url
        }
    }

    /// Inline payloads have their adjustments baked in; filters are only
    /// re-applied over non-inline references.
    pub fn render_plan(&self) -> RenderPlan<'_> {
        let image = self.display_image();
        match self.filters {
            Some(filters) if !is_inline(image) && !filters.is_neutral() => {
                RenderPlan::ApplyFilters(image, filters)
            }
            _ => RenderPlan::Baked(image),
        }
    }

    /// The lightweight projection stored inside a project
    pub fn to_entry(&self) -> ProjectShotEntry {
        ProjectShotEntry {
            id: self.id.clone(),
            image_url: self.non_inline_reference(),
            title: self.title.clone(),
            year: self.year.clone(),
            timestamp: self.timestamp,
            notes: self.notes.clone(),
        }
    }

    /// Best non-inline reference for this shot, or empty
    pub fn non_inline_reference(&self) -> String {
        [&self.image_url, &self.url]
            .into_iter()
            .find(|r| !r.is_empty() && !is_inline(r))
            .cloned()
            .unwrap_or_default()
    }
}

/// Title, year and notes edited by the user
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ShotDetails {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: String,
    #[serde(default)]
    pub notes: String,
}

/// Reduced shot metadata embedded in a project
///
/// `image_url` never holds an inline payload; those live in the shot map.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectShotEntry {
    pub id: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

/// Entry shape written when storage is under pressure
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MinimalShotEntry<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub timestamp: DateTime<Utc>,
}

impl<'a> From<&'a ProjectShotEntry> for MinimalShotEntry<'a> {
    fn from(entry: &'a ProjectShotEntry) -> Self {
        Self {
            id: &entry.id,
            title: &entry.title,
            timestamp: entry.timestamp,
        }
    }
}

/// A named collection of shots
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub shots: Vec<ProjectShotEntry>,
}

impl Project {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            updated_at: Utc::now(),
            shots: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Case-insensitive comparison against a trimmed candidate name
    pub fn has_name(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

/// Project shape written when storage is under pressure
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MinimalProject<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub updated_at: DateTime<Utc>,
    pub shots: Vec<MinimalShotEntry<'a>>,
}

impl<'a> From<&'a Project> for MinimalProject<'a> {
    fn from(project: &'a Project) -> Self {
        Self {
            id: &project.id,
            name: &project.name,
            updated_at: project.updated_at,
            shots: project.shots.iter().map(MinimalShotEntry::from).collect(),
        }
    }
}

/// Years were stored both as strings and as numbers
fn lenient_year<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Year {
        Text(String),
        Number(i64),
        Float(f64),
        Missing(()),
    }

    Ok(match Year::deserialize(deserializer)? {
        Year::Text(text) => text,
        Year::Number(n) => n.to_string(),
        Year::Float(f) if f.fract() == 0.0 => format!("{}", f as i64),
        Year::Float(f) => f.to_string(),
        Year::Missing(()) => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_detection() {
        assert!(is_inline("data:image/png;base64,AAAA"));
        assert!(!is_inline("/uploaded-shot.png"));
        assert!(!is_inline("https://example.com/a.jpg"));
    }

    #[test]
    fn test_filters_reapplied_over_remote_image() {
        let mut shot = ShotRecord::new("/shots/12.jpg");
        shot.filters = Some(FilterValues::new(130.0, 80.0, 0.0));

        assert_eq!(
            shot.render_plan(),
            RenderPlan::ApplyFilters("/shots/12.jpg", FilterValues::new(130.0, 80.0, 0.0))
        );
    }

    #[test]
    fn test_filters_never_reapplied_over_inline_image() {
        let mut shot = ShotRecord::new("/shots/12.jpg");
        shot.image_url = "data:image/png;base64,AAAA".to_string();
        shot.filters = Some(FilterValues::new(130.0, 80.0, 0.0));

        assert_eq!(shot.render_plan(), RenderPlan::Baked("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_entry_drops_inline_payload() {
        let mut shot = ShotRecord::new("/shots/12.jpg");
        shot.image_url = "data:image/png;base64,AAAA".to_string();
        assert_eq!(shot.to_entry().image_url, "/shots/12.jpg");

        let uploaded = ShotRecord::new("data:image/jpeg;base64,BBBB");
        assert_eq!(uploaded.to_entry().image_url, "");
    }

    #[test]
    fn test_year_accepts_numbers_and_strings() {
        let entry: ProjectShotEntry = serde_json::from_str(
            r#"{"id":"a","imageUrl":"/a.jpg","title":"Heat","year":1995,"timestamp":"2025-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(entry.year, "1995");

        let record: ShotRecord =
            serde_json::from_str(r#"{"id":"b","url":"/b.jpg","year":"","timestamp":"2025-01-02T03:04:05Z"}"#)
                .unwrap();
        assert_eq!(record.year, "");
        assert_eq!(record.display_image(), "/b.jpg");
    }

    #[test]
    fn test_year_accepts_float_numbers() {
        let entry: ProjectShotEntry = serde_json::from_str(
            r#"{"id":"a","imageUrl":"/a.jpg","year":1995.0,"timestamp":"2025-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(entry.year, "1995");

        let details: ShotDetails = serde_json::from_str(r#"{"year":1995.5}"#).unwrap();
        assert_eq!(details.year, "1995.5");
    }

    #[test]
    fn test_minimal_entry_reads_back_as_entry() {
        let mut project = Project::new("p", "P");
        project.shots.push(ShotRecord::new("/x.jpg").to_entry());

        let json = serde_json::to_string(&MinimalProject::from(&project)).unwrap();
        assert!(!json.contains("imageUrl"));

        let restored: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.shots[0].id, project.shots[0].id);
        assert_eq!(restored.shots[0].image_url, "");
    }

    #[test]
    fn test_project_name_comparison_is_case_insensitive() {
        let project = Project::new("foo", "Foo");
        assert!(project.has_name("  foo "));
        assert!(!project.has_name("food"));
    }
}
