//! Tracks copied out of a project.
//!
//! The clipboard lives outside the history stack but shares sample blocks
//! with it, so history pruning must keep whatever it references.

use crate::document::TrackDocument;
use crate::selection::SelectedRegion;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct Clipboard {
    tracks: TrackDocument,
    region: Mutex<SelectedRegion>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &TrackDocument {
        &self.tracks
    }

    /// Time range the contents were copied from.
    pub fn region(&self) -> SelectedRegion {
        *self.region.lock()
    }

    /// Replaces the contents with copies of `tracks`.
    pub fn assign(&self, tracks: &TrackDocument, region: SelectedRegion) {
        self.tracks.restore_from(tracks);
        *self.region.lock() = region;
    }

    pub fn clear(&self) {
        self.tracks.clear();
        *self.region.lock() = SelectedRegion::default();
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
