//! Track entity and identity.
//!
//! A track is one channel of editable content plus identity and display
//! metadata. Tracks have no behavior of their own beyond cloning and
//! merging; ordering, grouping, and notifications belong to the
//! [`TrackDocument`](crate::document::TrackDocument) that owns them.

mod note;
mod payload;

pub use note::{Note, NoteData};
pub use payload::{Label, LabelData, TempoData, TempoPoint, WaveData, DEFAULT_RATE};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Display height given to new tracks.
pub const DEFAULT_TRACK_HEIGHT: u32 = 150;

/// Height of a minimized channel group.
pub const MINIMIZED_TRACK_HEIGHT: u32 = 44;

/// Stable identity of a track across history snapshots.
///
/// Clones of a track in different snapshots share the id; it is the join
/// key used to reconcile pending updates and to restore undo states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(u64);

impl TrackId {
    /// Marks a track that no document has confirmed yet.
    pub const UNASSIGNED: TrackId = TrackId(0);

    /// Returns the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_assigned(&self) -> bool {
        *self != Self::UNASSIGNED
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_assigned() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#unassigned")
        }
    }
}

/// Allocator of track ids, shared by a project's live document and every
/// duplicate made from it, so an id is never handed out twice.
#[derive(Debug, Clone, Default)]
pub struct TrackIdSource(Arc<AtomicU64>);

impl TrackIdSource {
    /// Creates a source whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next id.
    pub fn next_id(&self) -> TrackId {
        TrackId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Makes sure ids issued later are greater than `id`.
    ///
    /// Needed when tracks with existing ids enter the project, e.g. from a
    /// saved file.
    pub fn observe(&self, id: TrackId) {
        self.0.fetch_max(id.0, Ordering::Relaxed);
    }
}

/// Content of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackKind {
    Wave(WaveData),
    Note(NoteData),
    Label(LabelData),
    Tempo(TempoData),
}

impl TrackKind {
    pub fn name(&self) -> &'static str {
        match self {
            TrackKind::Wave(_) => "wave",
            TrackKind::Note(_) => "note",
            TrackKind::Label(_) => "label",
            TrackKind::Tempo(_) => "tempo",
        }
    }
}

/// A single channel of editable content.
///
/// `linked`, `index`, and `y` are positional: they only mean something
/// relative to the document currently holding the track, so only the
/// document sets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    id: TrackId,

    name: String,

    selected: bool,

    /// True if this track and the next one form a stereo pair.
    linked: bool,

    height: u32,

    minimized: bool,

    #[serde(skip)]
    index: usize,

    /// Vertical display offset, accumulated over the preceding tracks.
    #[serde(skip)]
    y: u32,

    kind: TrackKind,
}

impl Track {
    /// Creates an unowned track with no id yet.
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: TrackId::UNASSIGNED,
            name: name.into(),
            selected: false,
            linked: false,
            height: DEFAULT_TRACK_HEIGHT,
            minimized: false,
            index: 0,
            y: 0,
            kind,
        }
    }

    pub fn wave(name: impl Into<String>, rate: u32) -> Self {
        Self::new(name, TrackKind::Wave(WaveData::new(rate)))
    }

    pub fn note(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Note(NoteData::new()))
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Label(LabelData::new()))
    }

    pub fn tempo(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Tempo(TempoData::new()))
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: TrackId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub(crate) fn set_linked(&mut self, linked: bool) {
        self.linked = linked;
    }

    /// Height the user chose, ignoring minimization.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn set_minimized(&mut self, minimized: bool) {
        self.minimized = minimized;
    }

    /// Position in the owning document.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub(crate) fn set_position(&mut self, index: usize, y: u32) {
        self.index = index;
        self.y = y;
    }

    pub fn kind(&self) -> &TrackKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut TrackKind {
        &mut self.kind
    }

    pub fn as_wave(&self) -> Option<&WaveData> {
        match &self.kind {
            TrackKind::Wave(wave) => Some(wave),
            _ => None,
        }
    }

    pub fn as_wave_mut(&mut self) -> Option<&mut WaveData> {
        match &mut self.kind {
            TrackKind::Wave(wave) => Some(wave),
            _ => None,
        }
    }

    /// Folds the user-controlled state of `other` into this track.
    pub fn merge(&mut self, other: &Track) {
        self.selected = other.selected;
    }

    /// Copies the display fields the foreground thread owns.
    pub(crate) fn copy_display_from(&mut self, other: &Track) {
        self.height = other.height;
        self.minimized = other.minimized;
        self.linked = other.linked;
        self.index = other.index;
        self.y = other.y;
    }

    /// End of the track's content in seconds.
    pub fn end_time(&self) -> f64 {
        match &self.kind {
            TrackKind::Wave(wave) => wave.end_time(),
            TrackKind::Note(notes) => notes.end_time(),
            TrackKind::Label(labels) => labels.labels().iter().map(|l| l.end).fold(0.0, f64::max),
            TrackKind::Tempo(_) => 0.0,
        }
    }
}
