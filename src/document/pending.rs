//! Staging area for changes proposed by a thread that does not own the
//! document.
//!
//! A background thread (typically recording) never edits the live track.
//! It registers a pending change, receives a shadow copy of the track, and
//! writes into the shadow. The foreground thread periodically reconciles
//! the shadow with the live track and eventually commits or discards it.

use super::arena::{Handle, TrackList};
use crate::track::{Track, TrackId, TrackKind};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shadow copy of a live track, shared with the thread that stages it.
pub type SharedTrack = Arc<Mutex<Track>>;

/// Folds the authoritative fields of a shadow (second argument) into the
/// live track (first argument).
///
/// Runs on the foreground thread with the shadow locked. It must not block
/// and must not touch the document.
pub type Updater = Arc<dyn Fn(&mut Track, &Track) + Send + Sync>;

/// Wraps a closure as an [`Updater`].
pub fn updater(f: impl Fn(&mut Track, &Track) + Send + Sync + 'static) -> Updater {
    Arc::new(f)
}

/// Updater for a recording thread that owns a wave track's audio: rate,
/// offset, and blocks come from the shadow. Everything else stays as the
/// user left it on the live track.
pub fn recording_updater() -> Updater {
    updater(|live, shadow| {
        if let (TrackKind::Wave(live), TrackKind::Wave(shadow)) = (live.kind_mut(), shadow.kind())
        {
            *live = shadow.clone();
        }
    })
}

/// The live track a shadow belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingSource {
    /// A confirmed track, looked up by id.
    Live(TrackId),
    /// A provisional track; it has no id yet, so the slot handle is kept.
    Provisional(Handle),
}

impl PendingSource {
    /// Finds the source in `list`, if it still exists.
    pub fn resolve(&self, list: &TrackList) -> Option<Handle> {
        match *self {
            PendingSource::Live(id) => list.find(id),
            PendingSource::Provisional(handle) => list.get(handle).map(|_| handle),
        }
    }
}

pub(crate) struct PendingEntry {
    pub source: PendingSource,
    pub shadow: SharedTrack,
    pub updater: Updater,
}

/// Staged shadows in registration order.
#[derive(Default)]
pub(crate) struct PendingUpdates {
    entries: Vec<PendingEntry>,
}

impl PendingUpdates {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, source: TrackId) -> bool {
        self.entries
            .iter()
            .any(|e| e.source == PendingSource::Live(source))
    }

    pub fn push(&mut self, entry: PendingEntry) {
        self.entries.push(entry);
    }

    pub fn shadow_of(&self, source: TrackId) -> Option<SharedTrack> {
        self.entries
            .iter()
            .find(|e| e.source == PendingSource::Live(source))
            .map(|e| Arc::clone(&e.shadow))
    }

    /// Copies of the entries, so reconciliation can run without holding
    /// the staging lock.
    pub fn snapshot(&self) -> Vec<(PendingSource, SharedTrack, Updater)> {
        self.entries
            .iter()
            .map(|e| (e.source, Arc::clone(&e.shadow), Arc::clone(&e.updater)))
            .collect()
    }

    pub fn take(&mut self) -> Vec<PendingEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// What [`TrackDocument::commit_pending`](super::TrackDocument::commit_pending)
/// did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Live tracks replaced by their reconciled shadows.
    pub replaced: Vec<TrackId>,

    /// Shadows whose source was deleted meanwhile, appended under new ids.
    pub reinstated: Vec<TrackId>,

    /// Provisional tracks that received their permanent id.
    pub confirmed: Vec<TrackId>,
}

impl CommitOutcome {
    /// Ids of every track that is new to the document.
    pub fn inserted(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.reinstated.iter().chain(&self.confirmed).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.replaced.is_empty() && self.reinstated.is_empty() && self.confirmed.is_empty()
    }
}
