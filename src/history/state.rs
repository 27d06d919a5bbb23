//! What one history entry remembers.

use crate::document::TrackDocument;
use crate::project::Project;
use crate::selection::SelectedRegion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Project data saved with each history state besides the tracks.
///
/// Extensions are shared between states by `Arc`, so an unchanged part
/// costs one reference count per state.
pub trait StateExtension: Send + Sync + fmt::Debug {
    /// Puts this saved part back into `project` on undo, redo, or a jump.
    fn restore(self: Arc<Self>, project: &mut Project);

    /// The project tags, if this extension holds them.
    fn tags(&self) -> Option<&Tags> {
        None
    }
}

/// A snapshot of the project: tracks, selection, and extensions.
///
/// Only [`HistoryManager`](super::HistoryManager) creates or changes
/// states; everyone else sees them through shared references.
#[derive(Debug)]
pub struct HistoryState {
    tracks: TrackDocument,
    selection: SelectedRegion,
    extensions: Vec<Arc<dyn StateExtension>>,
}

impl HistoryState {
    pub(crate) fn new(
        tracks: TrackDocument,
        selection: SelectedRegion,
        extensions: Vec<Arc<dyn StateExtension>>,
    ) -> Self {
        Self {
            tracks,
            selection,
            extensions,
        }
    }

    pub fn tracks(&self) -> &TrackDocument {
        &self.tracks
    }

    pub fn selection(&self) -> SelectedRegion {
        self.selection
    }

    pub fn extensions(&self) -> &[Arc<dyn StateExtension>] {
        &self.extensions
    }
}

/// Project metadata such as title and artist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    entries: BTreeMap<String, String>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Sets `key` to `value`; an empty value removes the tag.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        if value.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateExtension for Tags {
    fn restore(self: Arc<Self>, project: &mut Project) {
        project.restore_tags(self);
    }

    fn tags(&self) -> Option<&Tags> {
        Some(self)
    }
}
