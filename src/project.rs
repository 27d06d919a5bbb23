//! Project context.
//!
//! A project ties the live track document to its history, selection,
//! metadata, and clipboard. Command handlers receive it explicitly.

use crate::blocks::BlockStore;
use crate::clipboard::Clipboard;
use crate::config::{Config, TrackConfig};
use crate::document::{CommitOutcome, TrackDocument};
use crate::error::PersistError;
use crate::history::{HistoryManager, StateExtension, Tags};
use crate::selection::SelectedRegion;
use crate::track::{Track, TrackKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Captures one part of the project for a new history state.
pub type ExtensionSaver = Box<dyn Fn(&Project) -> Arc<dyn StateExtension> + Send + Sync>;

/// An open project.
pub struct Project {
    name: String,

    /// The document the user edits. History states are copies of it.
    tracks: Arc<TrackDocument>,

    history: HistoryManager,

    selection: SelectedRegion,

    tags: Arc<Tags>,

    clipboard: Arc<Clipboard>,

    savers: Vec<ExtensionSaver>,

    track_config: TrackConfig,
}

impl Project {
    /// Creates an empty project with no history.
    ///
    /// # Arguments
    ///
    /// * `name` - Project name
    /// * `store` - Block store that history pruning reclaims space from
    /// * `config` - History and track display settings
    pub fn new(name: impl Into<String>, store: Arc<dyn BlockStore>, config: &Config) -> Self {
        let clipboard = Arc::new(Clipboard::new());
        let history = HistoryManager::new(store)
            .with_clipboard(Arc::clone(&clipboard))
            .with_config(config.history.clone());
        let tracks = Arc::new(TrackDocument::new());
        tracks.set_minimized_height(config.tracks.minimized_height);

        let tags_saver: ExtensionSaver =
            Box::new(|project| Arc::clone(&project.tags) as Arc<dyn StateExtension>);

        Self {
            name: name.into(),
            tracks,
            history,
            selection: SelectedRegion::default(),
            tags: Arc::new(Tags::new()),
            clipboard,
            savers: vec![tags_saver],
            track_config: config.tracks.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live document.
    pub fn tracks(&self) -> &Arc<TrackDocument> {
        &self.tracks
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryManager {
        &mut self.history
    }

    pub fn selection(&self) -> SelectedRegion {
        self.selection
    }

    pub fn set_selection(&mut self, selection: SelectedRegion) {
        self.selection = selection;
    }

    pub fn clipboard(&self) -> &Arc<Clipboard> {
        &self.clipboard
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Sets a metadata tag. Earlier history states keep their own copy.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        Arc::make_mut(&mut self.tags).set(key, value);
    }

    pub(crate) fn restore_tags(&mut self, tags: Arc<Tags>) {
        self.tags = tags;
    }

    /// Adds another part of the project to every future history state.
    pub fn register_extension(&mut self, saver: ExtensionSaver) {
        self.savers.push(saver);
    }

    /// Creates a track sized by the project's display settings.
    pub fn new_track(&self, name: impl Into<String>, kind: TrackKind) -> Track {
        let mut track = Track::new(name, kind);
        track.set_height(self.track_config.default_height);
        track
    }

    // ---- History ----

    fn extensions(&self) -> Vec<Arc<dyn StateExtension>> {
        self.savers.iter().map(|saver| saver(self)).collect()
    }

    /// Records the live document as a new undo step.
    pub fn push_state(&mut self, description: &str, short_description: &str, consolidate: bool) {
        let extensions = self.extensions();
        self.history.push_state(
            &self.tracks,
            self.selection,
            extensions,
            description,
            short_description,
            consolidate,
        );
    }

    /// Amends the current undo step with the live document.
    pub fn modify_state(&mut self) {
        let extensions = self.extensions();
        self.history
            .modify_state(&self.tracks, self.selection, extensions);
    }

    /// Returns false if there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        if !self.history.undo_available() {
            return false;
        }
        self.history.undo();
        self.adopt_current();
        true
    }

    /// Returns false if there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        if !self.history.redo_available() {
            return false;
        }
        self.history.redo();
        self.adopt_current();
        true
    }

    /// Jumps to history state `n`. Returns false if it does not exist.
    pub fn set_state_to(&mut self, n: usize) -> bool {
        if n >= self.history.len() {
            return false;
        }
        self.history.set_state_to(n);
        self.adopt_current();
        true
    }

    /// Makes the live project match the current history state.
    fn adopt_current(&mut self) {
        let Some(state) = self.history.current() else {
            return;
        };
        let selection = state.selection();
        let extensions = state.extensions().to_vec();
        self.tracks.restore_from(state.tracks());
        self.selection = selection;
        for extension in extensions {
            extension.restore(self);
        }
    }

    // ---- Background updates ----

    /// Folds staged background changes into the live document. Call once
    /// per tick.
    pub fn reconcile_pending(&self) {
        self.tracks.reconcile_pending();
    }

    /// Commits staged changes and records them as one undo step.
    pub fn commit_pending(&mut self, description: &str, short_description: &str) -> CommitOutcome {
        let outcome = self.tracks.commit_pending();
        if !outcome.is_empty() {
            self.push_state(description, short_description, false);
        }
        outcome
    }

    /// Drops staged changes and provisional tracks.
    pub fn discard_pending(&self) -> Vec<Track> {
        self.tracks.discard_pending()
    }

    // ---- Clipboard ----

    /// Copies the selected tracks to the clipboard.
    ///
    /// # Returns
    ///
    /// Number of tracks copied
    pub fn copy_to_clipboard(&self) -> usize {
        let copied = TrackDocument::new();
        for track in self.tracks.tracks() {
            if track.is_selected() && track.id().is_assigned() {
                copied.add(track);
            }
        }
        self.clipboard.assign(&copied, self.selection);
        copied.len()
    }

    // ---- Persistence ----

    /// Snapshot of the current history state for writing to disk.
    ///
    /// Edits made since the last push, tags included, are not part of it.
    pub fn to_file(&self) -> Result<ProjectFile, PersistError> {
        let state = self.history.current().ok_or(PersistError::EmptyHistory)?;
        let tags = state
            .extensions()
            .iter()
            .find_map(|extension| extension.tags())
            .cloned()
            .unwrap_or_default();
        Ok(ProjectFile {
            name: self.name.clone(),
            tracks: state.tracks().tracks(),
            selection: state.selection(),
            tags,
        })
    }

    /// Writes the current history state to `path` and marks it saved.
    ///
    /// A `.json` extension selects JSON; anything else is binary.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        self.to_file()?.save(path)?;
        self.history.mark_saved();
        tracing::info!(path = %path.display(), states = self.history.len(), "Project saved");
        Ok(())
    }

    /// Loads a project file and starts its history with one saved state.
    pub fn open(
        path: impl AsRef<Path>,
        store: Arc<dyn BlockStore>,
        config: &Config,
    ) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let file = ProjectFile::load(path)?;
        let mut project = Self::from_file(file, store, config);
        project.push_state("Opened project", "Open", false);
        project.history.mark_saved();
        tracing::info!(
            path = %path.display(),
            tracks = project.tracks.len(),
            "Project opened"
        );
        Ok(project)
    }

    fn from_file(file: ProjectFile, store: Arc<dyn BlockStore>, config: &Config) -> Self {
        let mut project = Self::new(file.name, store, config);
        let count = file.tracks.len();
        let mut ids = Vec::with_capacity(count);
        let mut links = Vec::with_capacity(count);
        for track in file.tracks {
            links.push(track.is_linked());
            ids.push(project.tracks.add(track));
        }
        for (pos, id) in ids.iter().enumerate() {
            if links[pos] && pos + 1 < count && !(pos > 0 && links[pos - 1]) {
                let _ = project.tracks.group_channels(*id, 2);
            }
        }
        project.selection = file.selection;
        project.tags = Arc::new(file.tags);
        project
    }
}

/// On-disk form of a project: the current state only, no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,

    pub tracks: Vec<Track>,

    #[serde(default)]
    pub selection: SelectedRegion,

    #[serde(default)]
    pub tags: Tags,
}

impl ProjectFile {
    /// Serializes to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file writing fails
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Writes the compact binary form to `path`.
    ///
    /// Uses bincode; sample data dominates project size.
    pub fn save_to_binary<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistError> {
        let data = bincode::serialize(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        let data = fs::read(path)?;
        Ok(bincode::deserialize(&data)?)
    }

    fn is_json(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    /// Writes JSON or binary depending on the extension of `path`.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        if Self::is_json(path) {
            self.save_to_file(path)
        } else {
            self.save_to_binary(path)
        }
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        if Self::is_json(path) {
            Self::load_from_file(path)
        } else {
            Self::load_from_binary(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::MemoryBlockStore;
    use crate::document::recording_updater;
    use crate::track::NoteData;

    fn project() -> (Project, Arc<MemoryBlockStore>) {
        let store = Arc::new(MemoryBlockStore::new());
        let project = Project::new("Test", store.clone(), &Config::default());
        (project, store)
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("trackhistory_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_undo_restores_live_document() {
        let (mut project, _) = project();
        let id = project.tracks().add(Track::label("trackA"));
        project.push_state("Create Track", "Create", false);

        project.tracks().remove(id).unwrap();
        project.push_state("Delete Track", "Delete", false);
        assert!(project.tracks().is_empty());

        assert!(project.undo());
        assert_eq!(project.tracks().track_ids(), vec![id]);
        assert_eq!(project.tracks().get(id).unwrap().name(), "trackA");
        assert!(!project.undo());

        assert!(project.redo());
        assert!(project.tracks().is_empty());
        assert!(!project.redo());
    }

    #[test]
    fn test_undo_restores_tags_and_selection() {
        let (mut project, _) = project();
        project.set_tag("title", "First");
        project.push_state("Edit Metadata", "Metadata", false);

        project.set_tag("title", "Second");
        project.set_selection(SelectedRegion::new(1.0, 3.0));
        project.push_state("Edit Metadata", "Metadata", false);

        project.undo();
        assert_eq!(project.tags().get("title"), Some("First"));
        assert!(project.selection().is_point());

        project.set_state_to(1);
        assert_eq!(project.tags().get("title"), Some("Second"));
        assert_eq!(project.selection().t1(), 3.0);
        assert!(!project.set_state_to(7));
    }

    #[test]
    fn test_new_track_uses_configured_height() {
        let mut config = Config::default();
        config.tracks.default_height = 90;
        let project = Project::new("Sized", Arc::new(MemoryBlockStore::new()), &config);
        let track = project.new_track("N", TrackKind::Note(NoteData::new()));
        assert_eq!(track.height(), 90);
    }

    #[test]
    fn test_copy_to_clipboard_takes_selected_tracks() {
        let (mut project, _) = project();
        let a = project.tracks().add(Track::label("A"));
        project.tracks().add(Track::label("B"));
        project.tracks().set_selected(a, true).unwrap();
        project.set_selection(SelectedRegion::new(0.0, 4.0));

        assert_eq!(project.copy_to_clipboard(), 1);
        assert_eq!(project.clipboard().tracks().track_ids(), vec![a]);
        assert_eq!(project.clipboard().region().t1(), 4.0);
    }

    #[test]
    fn test_commit_pending_pushes_state() {
        let (mut project, store) = project();
        project.push_state("New Project", "New", false);

        let shadow = project
            .tracks()
            .register_pending_new_track(Track::wave("Take", 44100), recording_updater());
        let block = store.create_block(vec![0.0_f32; 32]);
        shadow.lock().as_wave_mut().unwrap().append_block(block);
        project.reconcile_pending();

        let outcome = project.commit_pending("Recorded Audio", "Record");
        assert_eq!(outcome.confirmed.len(), 1);
        assert_eq!(project.history().len(), 2);
        assert_eq!(project.history().current().unwrap().tracks().len(), 1);

        // Nothing staged: no new state
        project.commit_pending("Recorded Audio", "Record");
        assert_eq!(project.history().len(), 2);
    }

    #[test]
    fn test_save_requires_history() {
        let (mut project, _) = project();
        assert!(matches!(
            project.save(temp_path("empty.json")),
            Err(PersistError::EmptyHistory)
        ));
    }

    #[test]
    fn test_save_marks_saved_and_open_round_trips() {
        for name in ["round_trip.json", "round_trip.thp"] {
            let (mut project, store) = project();
            let ids = project
                .tracks()
                .add_channels(vec![Track::wave("L", 48000), Track::wave("R", 48000)]);
            let block = store.create_block(vec![0.25_f32; 16]);
            project
                .tracks()
                .update_content(ids[0], |kind| {
                    if let TrackKind::Wave(wave) = kind {
                        wave.append_block(block);
                    }
                })
                .unwrap();
            project.tracks().add(Track::label("Markers"));
            project.set_tag("artist", "Someone");
            project.push_state("Import", "Import", false);
            assert!(project.history().unsaved_changes());

            let path = temp_path(name);
            project.save(&path).unwrap();
            assert!(!project.history().unsaved_changes());

            let opened = Project::open(&path, store.clone(), &Config::default()).unwrap();
            let _ = fs::remove_file(&path);

            assert_eq!(opened.name(), "Test");
            assert_eq!(opened.tracks().track_ids(), project.tracks().track_ids());
            assert!(opened.tracks().get(ids[0]).unwrap().is_linked());
            assert_eq!(opened.tracks().channels(ids[1]), ids);
            let wave = opened.tracks().get(ids[0]).unwrap();
            assert_eq!(wave.as_wave().map(|w| w.sample_count()), Some(16));
            assert_eq!(opened.tags().get("artist"), Some("Someone"));
            assert_eq!(opened.history().len(), 1);
            assert!(!opened.history().unsaved_changes());

            // Fresh ids continue after the loaded ones
            let fresh = opened.tracks().add(Track::label("New"));
            assert_eq!(fresh.as_u64(), 4);
        }
    }

    #[test]
    fn test_to_file_uses_pushed_tags() {
        let (mut project, _) = project();
        project.set_tag("title", "Pushed");
        project.push_state("Edit Metadata", "Metadata", false);
        project.set_tag("title", "Unpushed");

        let file = project.to_file().unwrap();
        assert_eq!(file.tags.get("title"), Some("Pushed"));
        assert_eq!(project.tags().get("title"), Some("Unpushed"));
    }

    #[test]
    fn test_project_file_json() {
        let file = ProjectFile {
            name: "Demo".into(),
            tracks: vec![Track::label("Labels")],
            selection: SelectedRegion::new(0.5, 1.5),
            tags: Tags::new(),
        };
        let json = file.to_json().unwrap();
        assert_eq!(ProjectFile::from_json(&json).unwrap(), file);
        assert!(ProjectFile::from_json("{not json").is_err());
    }
}
