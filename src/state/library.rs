use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::data::{is_inline, MinimalProject, Project, ShotDetails, ShotRecord};
use super::edit::{builtin_presets, FilterValues, Preset};
use super::schema::{
    migrate_legacy_projects, parse_current_project, CURRENT_PROJECT_KEY, DEFAULT_PROJECT_ID,
    DEFAULT_PROJECT_NAME, LEGACY_PROJECTS_KEY, PRESETS_KEY, PROJECTS_KEY, SHOTS_KEY,
};
use super::storage::{KeyValueStore, StorageError};
use crate::render::{render_or_fallback, FilterRenderer};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("No project selected. Choose a project to save to.")]
    NoProjectSelected,

    #[error("Project '{0}' not found")]
    ProjectNotFound(String),

    #[error("Project name cannot be empty")]
    EmptyProjectName,

    #[error("A project named \"{0}\" already exists")]
    DuplicateProjectName(String),

    #[error("Shot '{0}' not found")]
    ShotNotFound(String),

    #[error("Preset name cannot be empty")]
    EmptyPresetName,

    #[error("Preset '{0}' not found")]
    PresetNotFound(String),

    #[error("Preset '{0}' is built in and cannot be deleted")]
    PresetNotDeletable(String),

    #[error("Shot '{0}' already has its adjustments baked into the image")]
    FiltersAlreadyBaked(String),

    #[error("Unable to save project: storage is full and even minimal metadata could not be written. Remove some saved projects or images and try again.")]
    MetadataNotSaved(#[source] StorageError),

    #[error("stored data under '{key}' is corrupt: {source}")]
    Corrupt {
        key: &'static str,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to serialize library state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// How much of the project list made it to storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveOutcome {
    /// Every project and shot reference was written
    Full,
    /// Storage was short on space; only ids, titles and timestamps were kept
    MinimalMetadata,
}

impl SaveOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            SaveOutcome::Full => "Saved to project.",
            SaveOutcome::MinimalMetadata => {
                "Saved, but storage is nearly full: only minimal shot metadata was kept for your projects."
            }
        }
    }
}

/// Result of writing both collections
#[derive(Debug)]
pub struct WriteReport {
    pub outcome: SaveOutcome,
    /// The shot map failed to persist; in-memory state still holds it
    pub shot_map_error: Option<StorageError>,
    /// Inline payloads moved out of project entries by compaction
    pub relocated: usize,
}

/// A value produced by an operation together with its write report
#[derive(Debug)]
pub struct Saved<T> {
    pub value: T,
    pub report: WriteReport,
}

/// A new or edited image to be saved into a project
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub project_id: Option<String>,
    /// The never-edited source reference
    pub original_ref: String,
    /// Inline payload of an AI edit or baked render, if any
    pub edited_payload: Option<String>,
    pub filters: FilterValues,
}

/// The Library keeps the shot map, the project list, presets and the
/// active project selection in sync with durable storage.
///
/// Writes never assume success: the project list is probed before it is
/// written and degrades to minimal metadata when storage is short.
pub struct Library<S: KeyValueStore> {
    store: S,
    shots: BTreeMap<String, Vec<ShotRecord>>,
    projects: Vec<Project>,
    presets: Vec<Preset>,
    active_project: Option<String>,
}

impl<S: KeyValueStore> Library<S> {
    /// Load every collection from `store`, upgrading older schemas.
    ///
    /// An empty store starts with a single default project, selected.
    pub fn open(store: S) -> Result<Self, LibraryError> {
        let shots: BTreeMap<String, Vec<ShotRecord>> =
            read_json(&store, SHOTS_KEY)?.unwrap_or_default();
        let presets: Vec<Preset> = read_json(&store, PRESETS_KEY)?.unwrap_or_else(builtin_presets);

        let mut library = Library {
            store,
            shots,
            projects: Vec::new(),
            presets,
            active_project: None,
        };

        match read_json::<S, Vec<Project>>(&library.store, PROJECTS_KEY)? {
            Some(projects) => library.projects = projects,
            None => library.load_legacy_or_default()?,
        }

        if let Some(raw) = library.store.get(CURRENT_PROJECT_KEY)? {
            let stored = parse_current_project(&raw);
            library.active_project = stored.filter(|id| library.project(id).is_some());
        }

        info!(
            projects = library.projects.len(),
            shot_keys = library.shots.len(),
            active = ?library.active_project,
            "library loaded"
        );
        Ok(library)
    }

    fn load_legacy_or_default(&mut self) -> Result<(), LibraryError> {
        match self.store.get(LEGACY_PROJECTS_KEY)? {
            Some(raw) => {
                self.projects = migrate_legacy_projects(&raw, &self.shots).map_err(|source| {
                    LibraryError::Corrupt {
                        key: LEGACY_PROJECTS_KEY,
                        source,
                    }
                })?;
                self.compact();
                let outcome = self.write_projects()?;
                self.store.remove(LEGACY_PROJECTS_KEY)?;
                info!(
                    projects = self.projects.len(),
                    ?outcome,
                    "migrated legacy project list"
                );
            }
            None => {
                self.projects = vec![Project::new(DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME)];
                self.active_project = Some(DEFAULT_PROJECT_ID.to_string());
            }
        }
        Ok(())
    }

    // ========== Queries ==========

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn active_project(&self) -> Option<&str> {
        self.active_project.as_deref()
    }

    /// Full shot records stored under a project key
    pub fn shots_for(&self, project_id: &str) -> &[ShotRecord] {
        self.shots.get(project_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn shot(&self, project_id: &str, shot_id: &str) -> Option<&ShotRecord> {
        self.shots_for(project_id).iter().find(|s| s.id == shot_id)
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    // ========== Projects ==========

    /// Create a project and make it the active one
    pub fn create_project(&mut self, name: &str) -> Result<Saved<Project>, LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::EmptyProjectName);
        }
        if self.projects.iter().any(|p| p.has_name(name)) {
            return Err(LibraryError::DuplicateProjectName(name.to_string()));
        }

        let project = Project::new(&self.unique_project_id(name), name);
        self.projects.push(project.clone());
        self.active_project = Some(project.id.clone());
        info!(id = %project.id, name = %project.name, "project created");

        let report = self.persist_all()?;
        Ok(Saved {
            value: project,
            report,
        })
    }

    pub fn rename_project(&mut self, id: &str, name: &str) -> Result<Saved<Project>, LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::EmptyProjectName);
        }
        if self.projects.iter().any(|p| p.id != id && p.has_name(name)) {
            return Err(LibraryError::DuplicateProjectName(name.to_string()));
        }

        let project = self.project_mut(id)?;
        project.name = name.to_string();
        project.touch();
        let project = project.clone();

        let report = self.persist_all()?;
        Ok(Saved {
            value: project,
            report,
        })
    }

    /// Remove a project. Its shot-map entries are left in place; see
    /// `prune_orphaned_shots`.
    pub fn delete_project(&mut self, id: &str) -> Result<WriteReport, LibraryError> {
        let index = self
            .projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| LibraryError::ProjectNotFound(id.to_string()))?;
        self.projects.remove(index);

        if self.active_project.as_deref() == Some(id) {
            self.active_project = None;
        }
        info!(id, "project deleted");

        self.persist_all()
    }

    pub fn set_active_project(&mut self, id: Option<&str>) -> Result<(), LibraryError> {
        if let Some(id) = id {
            if self.project(id).is_none() {
                return Err(LibraryError::ProjectNotFound(id.to_string()));
            }
        }
        self.active_project = id.map(str::to_string);
        self.write_active()?;
        Ok(())
    }

    // ========== Shots ==========

    /// Save an edited (or freshly adjusted) image into a project.
    ///
    /// The stored image is resolved through `renderer` first, then the
    /// record is appended and both collections are written.
    pub async fn commit_edited_shot(
        &mut self,
        request: CommitRequest,
        renderer: &dyn FilterRenderer,
    ) -> Result<Saved<ShotRecord>, LibraryError> {
        let project_id = self
            .require_project(request.project_id.as_deref())?
            .to_string();

        let stored_image = resolve_stored_image(
            renderer,
            &request.original_ref,
            request.edited_payload.as_deref(),
            &request.filters,
        )
        .await;

        self.commit_resolved(Some(&project_id), &request.original_ref, stored_image)
    }

    /// Second half of `commit_edited_shot`, for callers that render
    /// without holding the library.
    pub fn commit_resolved(
        &mut self,
        project_id: Option<&str>,
        original_ref: &str,
        stored_image: String,
    ) -> Result<Saved<ShotRecord>, LibraryError> {
        let project_id = self.require_project(project_id)?.to_string();

        let mut record = ShotRecord::new(original_ref);
        record.image_url = stored_image;
        self.append_shot(&project_id, record)
    }

    /// Add an uploaded image or a confirmed search result
    pub fn add_shot(
        &mut self,
        project_id: &str,
        image_ref: &str,
        details: ShotDetails,
    ) -> Result<Saved<ShotRecord>, LibraryError> {
        self.project_mut(project_id)?;

        let mut record = ShotRecord::new(image_ref);
        record.title = details.title;
        record.year = details.year;
        record.notes = details.notes;
        self.append_shot(project_id, record)
    }

    pub fn remove_shot(&mut self, project_id: &str, shot_id: &str) -> Result<WriteReport, LibraryError> {
        let project = self.project_mut(project_id)?;
        let before = project.shots.len();
        project.shots.retain(|s| s.id != shot_id);
        let removed_entry = project.shots.len() != before;
        project.touch();

        let mut removed_record = false;
        if let Some(records) = self.shots.get_mut(project_id) {
            let before = records.len();
            records.retain(|s| s.id != shot_id);
            removed_record = records.len() != before;
        }

        if !removed_entry && !removed_record {
            return Err(LibraryError::ShotNotFound(shot_id.to_string()));
        }
        self.persist_all()
    }

    /// Edit title, year and notes in both collections
    pub fn update_shot_details(
        &mut self,
        project_id: &str,
        shot_id: &str,
        details: ShotDetails,
    ) -> Result<Saved<ShotDetails>, LibraryError> {
        let project = self.project_mut(project_id)?;
        let mut found = false;

        if let Some(entry) = project.shots.iter_mut().find(|s| s.id == shot_id) {
            entry.title = details.title.clone();
            entry.year = details.year.clone();
            entry.notes = details.notes.clone();
            found = true;
        }
        project.touch();

        if let Some(record) = self
            .shots
            .get_mut(project_id)
            .and_then(|records| records.iter_mut().find(|s| s.id == shot_id))
        {
            record.title = details.title.clone();
            record.year = details.year.clone();
            record.notes = details.notes.clone();
            found = true;
        }

        if !found {
            return Err(LibraryError::ShotNotFound(shot_id.to_string()));
        }
        let report = self.persist_all()?;
        Ok(Saved {
            value: details,
            report,
        })
    }

    /// Store view-time adjustments on a shot whose image is a plain
    /// reference. Inline images already carry their adjustments.
    pub fn set_shot_filters(
        &mut self,
        project_id: &str,
        shot_id: &str,
        filters: FilterValues,
    ) -> Result<Saved<ShotRecord>, LibraryError> {
        self.project_mut(project_id)?.touch();

        let record = self
            .shots
            .get_mut(project_id)
            .and_then(|records| records.iter_mut().find(|s| s.id == shot_id))
            .ok_or_else(|| LibraryError::ShotNotFound(shot_id.to_string()))?;

        if is_inline(record.display_image()) {
            return Err(LibraryError::FiltersAlreadyBaked(shot_id.to_string()));
        }

        let filters = filters.clamped();
        record.filters = (!filters.is_neutral()).then_some(filters);
        let record = record.clone();

        let report = self.persist_all()?;
        Ok(Saved {
            value: record,
            report,
        })
    }

    /// Drop shot-map keys that no longer belong to any project.
    ///
    /// Returns the number of shot records removed.
    pub fn prune_orphaned_shots(&mut self) -> Result<usize, LibraryError> {
        let projects = &self.projects;
        let mut removed = 0;
        self.shots.retain(|key, records| {
            let keep = projects.iter().any(|p| &p.id == key);
            if !keep {
                removed += records.len();
            }
            keep
        });

        if removed > 0 {
            self.write_shot_map()?;
            info!(removed, "pruned orphaned shots");
        }
        Ok(removed)
    }

    // ========== Presets ==========

    pub fn save_preset(&mut self, name: &str, filters: FilterValues) -> Result<Preset, LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::EmptyPresetName);
        }

        let preset = Preset::custom(name, filters.clamped());
        self.presets.push(preset.clone());
        self.write_presets()?;
        Ok(preset)
    }

    pub fn delete_preset(&mut self, id: &str) -> Result<(), LibraryError> {
        let index = self
            .presets
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| LibraryError::PresetNotFound(id.to_string()))?;
        if !self.presets[index].is_deletable() {
            return Err(LibraryError::PresetNotDeletable(id.to_string()));
        }

        self.presets.remove(index);
        self.write_presets()
    }

    // ========== Internals ==========

    fn require_project(&self, id: Option<&str>) -> Result<&str, LibraryError> {
        id.and_then(|id| self.project(id))
            .map(|p| p.id.as_str())
            .ok_or(LibraryError::NoProjectSelected)
    }

    fn project_mut(&mut self, id: &str) -> Result<&mut Project, LibraryError> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| LibraryError::ProjectNotFound(id.to_string()))
    }

    fn unique_project_id(&self, name: &str) -> String {
        let base = slugify(name);
        if base.is_empty() {
            return uuid::Uuid::new_v4().to_string();
        }

        let taken = |id: &str| self.projects.iter().any(|p| p.id == id);
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn append_shot(
        &mut self,
        project_id: &str,
        record: ShotRecord,
    ) -> Result<Saved<ShotRecord>, LibraryError> {
        let entry = record.to_entry();

        let project = self.project_mut(project_id)?;
        project.shots.push(entry);
        project.touch();

        self.shots
            .entry(project_id.to_string())
            .or_default()
            .push(record.clone());
        debug!(project = project_id, shot = %record.id, "shot appended");

        let report = self.persist_all()?;
        Ok(Saved {
            value: record,
            report,
        })
    }

    /// Move inline payloads out of every project entry into the shot map.
    ///
    /// Returns the number of entries rewritten.
    fn compact(&mut self) -> usize {
        let Self { projects, shots, .. } = self;
        let mut relocated = 0;

        for project in projects.iter_mut() {
            for entry in project.shots.iter_mut().filter(|e| is_inline(&e.image_url)) {
                let payload = std::mem::take(&mut entry.image_url);
                let records = shots.entry(project.id.clone()).or_default();

                match records.iter().position(|r| r.id == entry.id) {
                    // The record already holds a different payload; the
                    // entry's payload becomes a shot of its own
                    Some(i) if is_inline(&records[i].image_url) && records[i].image_url != payload => {
                        let kept = ShotRecord {
                            image_url: payload,
                            title: entry.title.clone(),
                            year: entry.year.clone(),
                            notes: entry.notes.clone(),
                            timestamp: entry.timestamp,
                            ..ShotRecord::new(&records[i].url)
                        };
                        debug!(project = %project.id, shot = %entry.id, kept = %kept.id, "split conflicting inline payload");
                        entry.id = kept.id.clone();
                        entry.image_url = kept.non_inline_reference();
                        records.push(kept);
                    }
                    Some(i) => {
                        let record = &mut records[i];
                        if !is_inline(&record.image_url) {
                            record.image_url = payload;
                            record.filters = None;
                        }
                        entry.image_url = record.non_inline_reference();
                    }
                    None => {
                        records.push(ShotRecord {
                            id: entry.id.clone(),
                            url: payload.clone(),
                            image_url: payload,
                            filters: None,
                            title: entry.title.clone(),
                            year: entry.year.clone(),
                            notes: entry.notes.clone(),
                            timestamp: entry.timestamp,
                        });
                    }
                }
                relocated += 1;
            }
        }

        if relocated > 0 {
            debug!(relocated, "relocated inline payloads into the shot map");
        }
        relocated
    }

    /// Compact, then write the shot map, the project list and the
    /// active selection in that order.
    fn persist_all(&mut self) -> Result<WriteReport, LibraryError> {
        let relocated = self.compact();

        let shot_map_error = match self.write_shot_map() {
            Ok(()) => None,
            Err(LibraryError::Storage(e)) => {
                warn!(error = %e, "shot map not persisted, keeping in-memory state");
                Some(e)
            }
            Err(other) => return Err(other),
        };

        let outcome = self.write_projects()?;

        if let Err(e) = self.write_active() {
            warn!(error = %e, "active project selection not persisted");
        }

        Ok(WriteReport {
            outcome,
            shot_map_error,
            relocated,
        })
    }

    fn write_shot_map(&mut self) -> Result<(), LibraryError> {
        let value = serde_json::to_string(&self.shots)?;
        self.write_probed(SHOTS_KEY, &value)
    }

    /// Probe the full project list; fall back to minimal metadata
    fn write_projects(&mut self) -> Result<SaveOutcome, LibraryError> {
        let full = serde_json::to_string(&self.projects)?;
        if self.store.can_persist(PROJECTS_KEY, &full)? {
            match self.store.set(PROJECTS_KEY, &full) {
                Ok(()) => return Ok(SaveOutcome::Full),
                Err(e) => warn!(error = %e, "project list write failed after probe"),
            }
        } else {
            warn!(bytes = full.len(), "project list does not fit, writing minimal metadata");
        }

        let minimal: Vec<MinimalProject<'_>> = self.projects.iter().map(MinimalProject::from).collect();
        let minimal = serde_json::to_string(&minimal)?;
        self.store
            .set(PROJECTS_KEY, &minimal)
            .map_err(LibraryError::MetadataNotSaved)?;
        Ok(SaveOutcome::MinimalMetadata)
    }

    fn write_presets(&mut self) -> Result<(), LibraryError> {
        let value = serde_json::to_string(&self.presets)?;
        self.write_probed(PRESETS_KEY, &value)
    }

    fn write_active(&mut self) -> Result<(), LibraryError> {
        let value = serde_json::to_string(&self.active_project)?;
        self.write_probed(CURRENT_PROJECT_KEY, &value)
    }

    fn write_probed(&mut self, key: &str, value: &str) -> Result<(), LibraryError> {
        if !self.store.can_persist(key, value)? {
            return Err(StorageError::WouldExceedQuota {
                key: key.to_string(),
                bytes: value.len(),
            }
            .into());
        }
        self.store.set(key, value)?;
        Ok(())
    }
}

/// Decide what a committed shot stores as its current image.
///
/// - inline edit, neutral filters: the edit as-is
/// - inline edit, adjusted filters: the edit re-rendered with the filters
/// - no edit, adjusted filters: the original rendered with the filters
/// - no edit, neutral filters: the original reference
pub async fn resolve_stored_image(
    renderer: &dyn FilterRenderer,
    original_ref: &str,
    edited_payload: Option<&str>,
    filters: &FilterValues,
) -> String {
    match edited_payload.filter(|payload| is_inline(payload)) {
        Some(payload) if filters.is_neutral() => payload.to_string(),
        Some(payload) => render_or_fallback(renderer, payload, filters).await,
        None if filters.is_neutral() => original_ref.to_string(),
        None => render_or_fallback(renderer, original_ref, filters).await,
    }
}

/// Lowercase, keep `[a-z0-9]`, turn whitespace runs into single dashes
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if (ch.is_whitespace() || ch == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

fn read_json<S: KeyValueStore, T: DeserializeOwned>(
    store: &S,
    key: &'static str,
) -> Result<Option<T>, LibraryError> {
    store
        .get(key)?
        .map(|raw| serde_json::from_str(&raw).map_err(|source| LibraryError::Corrupt { key, source }))
        .transpose()
}

// Implement Debug without dumping every payload
impl<S: KeyValueStore> std::fmt::Debug for Library<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("projects", &self.projects.len())
            .field("shot_keys", &self.shots.len())
            .field("presets", &self.presets.len())
            .field("active_project", &self.active_project)
            .finish()
    }
}
