//! Multi-level undo/redo over snapshots of the track document.
//!
//! The manager keeps a stack of [`HistoryState`]s and the index of the
//! current one. New states truncate the redo branch, consecutive edits with
//! the same description may be consolidated into one state, and removing
//! states first asks the block store to delete every block no surviving
//! state (or the clipboard) still references.

mod space;
mod state;

pub use space::{inspect_blocks, space_usage};
pub use state::{HistoryState, StateExtension, Tags};

use crate::blocks::{BlockIdSet, BlockStore};
use crate::clipboard::Clipboard;
use crate::config::HistoryConfig;
use crate::document::{Subscribers, SubscriptionId, TrackDocument};
use crate::selection::SelectedRegion;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Notification emitted by a [`HistoryManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEvent {
    Pushed,
    Modified,
    Renamed,
    UndoOrRedo,
    /// The current state was set by a jump.
    Reset,
    /// States `begin..end` are about to be removed.
    BeginPurge {
        begin: usize,
        end: usize,
    },
    EndPurge,
}

struct HistoryEntry {
    state: HistoryState,
    description: String,
    short_description: String,
}

/// Manages the undo/redo stack.
///
/// All operations are meant for the foreground thread. Calling
/// [`undo`](Self::undo), [`redo`](Self::redo), or
/// [`set_state_to`](Self::set_state_to) when unavailable is a caller bug
/// and panics.
pub struct HistoryManager {
    stack: Vec<HistoryEntry>,

    /// Index of the state the project currently shows.
    current: Option<usize>,

    /// Index of the state last written to disk.
    saved: Option<usize>,

    /// Description of the last push, compared in full to decide whether the
    /// next push may be consolidated.
    last_action: Option<String>,

    may_consolidate: bool,

    /// Bytes attributed to each state by the last space calculation.
    space: Vec<u64>,

    clipboard_space: u64,

    store: Arc<dyn BlockStore>,

    clipboard: Option<Arc<Clipboard>>,

    config: HistoryConfig,

    subscribers: Subscribers<HistoryEvent>,
}

impl HistoryManager {
    /// Creates an empty history that reclaims blocks through `store`.
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self {
            stack: Vec::new(),
            current: None,
            saved: None,
            last_action: None,
            may_consolidate: false,
            space: Vec::new(),
            clipboard_space: 0,
            store,
            clipboard: None,
            config: HistoryConfig::default(),
            subscribers: Subscribers::new(),
        }
    }

    /// Keeps the blocks of `clipboard` alive when pruning.
    pub fn with_clipboard(mut self, clipboard: Arc<Clipboard>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn with_config(mut self, config: HistoryConfig) -> Self {
        self.config = config;
        self
    }

    // ---- Queries ----

    /// Number of states in the stack.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Index of the current state, `None` while the history is empty.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&HistoryState> {
        self.current.and_then(|n| self.state(n))
    }

    pub fn state(&self, n: usize) -> Option<&HistoryState> {
        self.stack.get(n).map(|e| &e.state)
    }

    pub fn undo_available(&self) -> bool {
        self.current.is_some_and(|c| c > 0)
    }

    pub fn redo_available(&self) -> bool {
        self.current.is_some_and(|c| c + 1 < self.stack.len())
    }

    /// Returns true if the current state is not the one last saved.
    pub fn unsaved_changes(&self) -> bool {
        self.saved != self.current
    }

    /// Records that the current state has been written to disk.
    pub fn mark_saved(&mut self) {
        self.saved = self.current;
    }

    /// Description of the most recent push, cleared by undo, redo, or a jump.
    pub fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    // ---- Transitions ----

    /// Records a new undo step.
    ///
    /// With `consolidate` set, a push whose description equals the previous
    /// push's amends the current state instead of adding one.
    ///
    /// # Arguments
    ///
    /// * `tracks` - The live document; it is duplicated, leaving out
    ///   provisional tracks
    /// * `selection` - The selection to restore with this state
    /// * `extensions` - Other project data to restore with this state
    /// * `description` - Full description of the action, shown in menus
    /// * `short_description` - Name of the action for history listings
    /// * `consolidate` - Whether this push may merge with the previous one
    pub fn push_state(
        &mut self,
        tracks: &TrackDocument,
        selection: SelectedRegion,
        extensions: Vec<Arc<dyn StateExtension>>,
        description: &str,
        short_description: &str,
        consolidate: bool,
    ) {
        if consolidate && self.may_consolidate && self.last_action.as_deref() == Some(description)
        {
            self.modify_state(tracks, selection, extensions);
            // The saved state was just changed in place
            if self.current == self.saved {
                self.saved = None;
            }
            debug!(label = description, "History state consolidated");
            return;
        }

        let state = HistoryState::new(tracks.duplicate(), selection, extensions);
        self.may_consolidate = true;
        // The abandoned redo branch may share blocks with the new state
        let from = self.current.map_or(0, |c| c + 1);
        self.purge(from, self.stack.len(), Some(state.tracks()));

        self.stack.push(HistoryEntry {
            state,
            description: description.to_string(),
            short_description: short_description.to_string(),
        });
        let current = self.stack.len() - 1;
        self.current = Some(current);
        if self.saved.is_some_and(|s| s >= current) {
            self.saved = None;
        }
        self.last_action = Some(description.to_string());
        self.space.clear();

        if let Some(max) = self.config.max_states {
            let excess = self.stack.len().saturating_sub(max.max(1));
            if excess > 0 {
                self.remove_old_states(excess);
            }
        }

        debug!(
            label = description,
            undo_depth = self.stack.len(),
            "History state pushed"
        );
        self.subscribers.notify(&[HistoryEvent::Pushed]);
    }

    /// Replaces the tracks, selection, and extensions of the current state
    /// without creating an undo step. Does nothing while the history is
    /// empty.
    pub fn modify_state(
        &mut self,
        tracks: &TrackDocument,
        selection: SelectedRegion,
        extensions: Vec<Arc<dyn StateExtension>>,
    ) {
        let Some(current) = self.current else {
            return;
        };
        let state = HistoryState::new(tracks.duplicate(), selection, extensions);
        self.stack[current].state = state;
        self.space.clear();
        debug!(current, "History state modified");
        self.subscribers.notify(&[HistoryEvent::Modified]);
    }

    /// Steps back one state and returns it for the caller to adopt.
    ///
    /// # Panics
    ///
    /// If [`undo_available`](Self::undo_available) is false.
    pub fn undo(&mut self) -> &HistoryState {
        assert!(self.undo_available(), "undo called with nothing to undo");
        let current = self.current.map_or(0, |c| c - 1);
        self.enter_state(current, HistoryEvent::UndoOrRedo);
        debug!(
            label = %self.stack[current].description,
            current,
            "Undo"
        );
        &self.stack[current].state
    }

    /// Steps forward one state and returns it for the caller to adopt.
    ///
    /// # Panics
    ///
    /// If [`redo_available`](Self::redo_available) is false.
    pub fn redo(&mut self) -> &HistoryState {
        assert!(self.redo_available(), "redo called with nothing to redo");
        let current = self.current.map_or(0, |c| c + 1);
        self.enter_state(current, HistoryEvent::UndoOrRedo);
        debug!(
            label = %self.stack[current].description,
            current,
            "Redo"
        );
        &self.stack[current].state
    }

    /// Jumps to state `n`.
    ///
    /// # Panics
    ///
    /// If `n` is out of range.
    pub fn set_state_to(&mut self, n: usize) -> &HistoryState {
        assert!(
            n < self.stack.len(),
            "state {n} out of range for a history of {}",
            self.stack.len()
        );
        self.enter_state(n, HistoryEvent::Reset);
        debug!(current = n, "Jumped to history state");
        &self.stack[n].state
    }

    fn enter_state(&mut self, n: usize, event: HistoryEvent) {
        self.current = Some(n);
        self.last_action = None;
        self.may_consolidate = false;
        self.subscribers.notify(&[event]);
    }

    /// Prevents the next push from being consolidated with the last one.
    pub fn stop_consolidating(&mut self) {
        self.may_consolidate = false;
    }

    // ---- Descriptions ----

    /// Full description of state `n` and the bytes attributed to it by the
    /// last [`calculate_space_usage`](Self::calculate_space_usage).
    pub fn long_description(&self, n: usize) -> Option<(&str, u64)> {
        let entry = self.stack.get(n)?;
        let space = self.space.get(n).copied().unwrap_or_default();
        Some((entry.description.as_str(), space))
    }

    pub fn short_description(&self, n: usize) -> Option<&str> {
        self.stack.get(n).map(|e| e.short_description.as_str())
    }

    pub fn set_long_description(&mut self, n: usize, description: impl Into<String>) {
        if let Some(entry) = self.stack.get_mut(n) {
            entry.description = description.into();
        }
    }

    /// Changes both descriptions of state `n`.
    pub fn rename_state(
        &mut self,
        n: usize,
        description: impl Into<String>,
        short_description: impl Into<String>,
    ) {
        let Some(entry) = self.stack.get_mut(n) else {
            return;
        };
        entry.description = description.into();
        entry.short_description = short_description.into();
        self.subscribers.notify(&[HistoryEvent::Renamed]);
    }

    // ---- Traversal ----

    /// Calls `f` with the index and state of every entry.
    pub fn visit_states(&self, newest_first: bool, mut f: impl FnMut(usize, &HistoryState)) {
        let states = self.stack.iter().enumerate();
        if newest_first {
            for (n, entry) in states.rev() {
                f(n, &entry.state);
            }
        } else {
            for (n, entry) in states {
                f(n, &entry.state);
            }
        }
    }

    /// Visits states `begin..end`, or, when `end < begin`, states
    /// `begin` down to `end + 1`, newest first.
    pub fn visit_range(&self, begin: usize, end: usize, mut f: impl FnMut(usize, &HistoryState)) {
        let len = self.stack.len();
        if begin < end {
            for n in begin..end.min(len) {
                f(n, &self.stack[n].state);
            }
        } else if len > 0 {
            let begin = begin.min(len - 1);
            for n in (end + 1..=begin).rev() {
                f(n, &self.stack[n].state);
            }
        }
    }

    // ---- Pruning ----

    /// Discards states `begin..end` and reclaims the blocks only they used.
    ///
    /// # Panics
    ///
    /// If the range holds the current state while other states remain.
    pub fn remove_states(&mut self, begin: usize, end: usize) {
        self.purge(begin, end, None);
    }

    /// Removes states `begin..end`, also keeping the blocks of `keep`.
    fn purge(&mut self, begin: usize, end: usize, keep: Option<&TrackDocument>) {
        let end = end.min(self.stack.len());
        if begin >= end {
            return;
        }
        let everything = begin == 0 && end == self.stack.len();
        if let Some(current) = self.current {
            assert!(
                everything || !(begin..end).contains(&current),
                "cannot remove the current history state {current} while others remain"
            );
        }

        self.subscribers
            .notify(&[HistoryEvent::BeginPurge { begin, end }]);

        let mut retained = self.retained_blocks(begin, end);
        if let Some(keep) = keep {
            inspect_blocks(keep, |_| {}, &mut retained);
        }
        match self.store.delete_blocks_except(&retained) {
            Ok(deleted) => debug!(begin, end, deleted, "Reclaimed history blocks"),
            Err(e) => warn!(
                begin,
                end,
                error = %e,
                "Failed to reclaim history blocks; orphans left in the store"
            ),
        }

        self.stack.drain(begin..end);
        let removed = end - begin;
        let shift = |index: Option<usize>| match index {
            Some(i) if i < begin => Some(i),
            Some(i) if i >= end => Some(i - removed),
            _ => None,
        };
        self.current = shift(self.current);
        self.saved = shift(self.saved);
        self.space.clear();

        self.subscribers.notify(&[HistoryEvent::EndPurge]);
    }

    /// Discards every state from index `from` on.
    pub fn remove_new_states(&mut self, from: usize) {
        self.remove_states(from, self.stack.len());
    }

    /// Discards the `count` oldest states.
    pub fn remove_old_states(&mut self, count: usize) {
        self.remove_states(0, count);
    }

    /// Discards the redo branch.
    pub fn abandon_redo(&mut self) {
        if let Some(current) = self.current {
            self.remove_new_states(current + 1);
        }
    }

    /// Discards every state.
    pub fn clear_states(&mut self) {
        self.remove_states(0, self.stack.len());
        self.current = None;
        self.saved = None;
        self.last_action = None;
        self.may_consolidate = false;
    }

    /// Blocks referenced outside `begin..end`, including the clipboard's.
    fn retained_blocks(&self, begin: usize, end: usize) -> BlockIdSet {
        let mut retained = BlockIdSet::new();
        for (n, entry) in self.stack.iter().enumerate() {
            if !(begin..end).contains(&n) {
                inspect_blocks(entry.state.tracks(), |_| {}, &mut retained);
            }
        }
        if let Some(clipboard) = &self.clipboard {
            inspect_blocks(clipboard.tracks(), |_| {}, &mut retained);
        }
        retained
    }

    // ---- Space accounting ----

    /// Attributes the size of every block to the newest state using it.
    ///
    /// Deleting states oldest first frees a block only once its newest user
    /// is gone, so this is the space each deletion actually reclaims. The
    /// clipboard is counted separately.
    pub fn calculate_space_usage(&mut self) {
        let mut seen = BlockIdSet::new();
        let mut space = vec![0; self.stack.len()];
        for (n, entry) in self.stack.iter().enumerate().rev() {
            space[n] = space_usage(entry.state.tracks(), &mut seen);
        }
        self.space = space;

        seen.clear();
        self.clipboard_space = self
            .clipboard
            .as_ref()
            .map_or(0, |c| space_usage(c.tracks(), &mut seen));
    }

    /// Bytes attributed to state `n`, zero before the first calculation.
    pub fn space_usage(&self, n: usize) -> u64 {
        self.space.get(n).copied().unwrap_or_default()
    }

    pub fn clipboard_space_usage(&self) -> u64 {
        self.clipboard_space
    }

    // ---- Notifications ----

    pub fn subscribe(
        &self,
        callback: impl Fn(&HistoryEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

impl fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryManager")
            .field("states", &self.stack.len())
            .field("current", &self.current)
            .field("saved", &self.saved)
            .field("last_action", &self.last_action)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockId, MemoryBlockStore, SampleBlock};
    use crate::error::StoreError;
    use crate::track::Track;
    use parking_lot::Mutex;

    fn history() -> (HistoryManager, Arc<MemoryBlockStore>) {
        let store = Arc::new(MemoryBlockStore::new());
        (HistoryManager::new(store.clone()), store)
    }

    fn push(history: &mut HistoryManager, doc: &TrackDocument, description: &str) {
        history.push_state(
            doc,
            SelectedRegion::default(),
            Vec::new(),
            description,
            description,
            false,
        );
    }

    fn push_consolidating(history: &mut HistoryManager, doc: &TrackDocument, description: &str) {
        history.push_state(
            doc,
            SelectedRegion::default(),
            Vec::new(),
            description,
            description,
            true,
        );
    }

    fn wave_with(blocks: &[&Arc<SampleBlock>]) -> Track {
        let mut track = Track::wave("Audio", 44100);
        if let Some(wave) = track.as_wave_mut() {
            for block in blocks {
                wave.append_block(Arc::clone(block));
            }
        }
        track
    }

    #[test]
    fn test_round_trip() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        doc.add(Track::label("A"));
        push(&mut history, &doc, "D1");
        let d1 = doc.duplicate();

        doc.add(Track::label("B"));
        push(&mut history, &doc, "D2");
        let d2 = doc.duplicate();

        assert!(history.undo_available());
        assert!(!history.redo_available());
        assert_eq!(*history.undo().tracks(), d1);
        assert!(history.redo_available());
        assert_eq!(*history.redo().tracks(), d2);
        assert_eq!(history.current_index(), Some(1));
    }

    #[test]
    fn test_create_delete_undo_scenario() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        let id = doc.add(Track::label("trackA"));
        assert_eq!(id.as_u64(), 1);
        push(&mut history, &doc, "Create Track");

        doc.remove(id).unwrap();
        push(&mut history, &doc, "Delete Track");

        let state = history.undo();
        doc.restore_from(state.tracks());
        let tracks = doc.tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id(), id);
        assert_eq!(tracks[0].name(), "trackA");
    }

    #[test]
    fn test_consolidation() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        let a = doc.add(Track::label("A"));
        let b = doc.add(Track::label("B"));
        push(&mut history, &doc, "Create");
        let before = history.len();

        doc.permute(&[b, a]).unwrap();
        push_consolidating(&mut history, &doc, "Move Track");
        doc.permute(&[a, b]).unwrap();
        push_consolidating(&mut history, &doc, "Move Track");

        assert_eq!(history.len(), before + 1);
        assert_eq!(*history.current().unwrap().tracks(), doc);
    }

    #[test]
    fn test_consolidation_requires_same_description() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        push_consolidating(&mut history, &doc, "Move Track Up");
        push_consolidating(&mut history, &doc, "Move Track Down");
        assert_eq!(history.len(), 2);

        history.stop_consolidating();
        push_consolidating(&mut history, &doc, "Move Track Down");
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_no_consolidation_across_undo() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        push(&mut history, &doc, "Create");
        push_consolidating(&mut history, &doc, "Move Track");
        history.undo();
        assert_eq!(history.last_action(), None);

        push_consolidating(&mut history, &doc, "Move Track");
        assert_eq!(history.len(), 2);
        assert_eq!(history.current_index(), Some(1));
    }

    #[test]
    fn test_dirty_tracking() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        assert!(!history.unsaved_changes());

        push(&mut history, &doc, "Create");
        assert!(history.unsaved_changes());
        history.mark_saved();
        assert!(!history.unsaved_changes());

        push(&mut history, &doc, "Edit");
        assert!(history.unsaved_changes());
        history.undo();
        assert!(!history.unsaved_changes());
    }

    #[test]
    fn test_consolidating_saved_state_makes_it_dirty() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        push_consolidating(&mut history, &doc, "Nudge");
        history.mark_saved();

        push_consolidating(&mut history, &doc, "Nudge");
        assert_eq!(history.len(), 1);
        assert!(history.unsaved_changes());
    }

    #[test]
    fn test_push_after_undo_abandons_redo() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        for label in ["A", "B", "C"] {
            push(&mut history, &doc, label);
        }
        history.mark_saved();
        history.undo();
        history.undo();

        push(&mut history, &doc, "D");
        assert_eq!(history.len(), 2);
        assert!(!history.redo_available());
        assert_eq!(history.short_description(1), Some("D"));
        // The saved state was in the abandoned branch
        assert!(history.unsaved_changes());
    }

    #[test]
    fn test_modify_state_keeps_position() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        history.modify_state(&doc, SelectedRegion::default(), Vec::new());
        assert!(history.is_empty());

        push(&mut history, &doc, "Create");
        doc.add(Track::label("A"));
        history.modify_state(&doc, SelectedRegion::new(0.0, 2.0), Vec::new());

        assert_eq!(history.len(), 1);
        let current = history.current().unwrap();
        assert_eq!(current.tracks().len(), 1);
        assert_eq!(current.selection().t1(), 2.0);
    }

    #[test]
    fn test_provisional_tracks_not_captured() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        doc.add(Track::label("A"));
        doc.register_pending_new_track(
            Track::wave("Take", 44100),
            crate::document::recording_updater(),
        );
        push(&mut history, &doc, "Record");
        assert_eq!(history.current().unwrap().tracks().len(), 1);
    }

    #[test]
    #[should_panic(expected = "nothing to undo")]
    fn test_undo_at_oldest_panics() {
        let (mut history, _) = history();
        push(&mut history, &TrackDocument::new(), "Only");
        history.undo();
    }

    #[test]
    #[should_panic(expected = "nothing to redo")]
    fn test_redo_at_newest_panics() {
        let (mut history, _) = history();
        history.redo();
    }

    #[test]
    fn test_set_state_to() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        for label in ["A", "B", "C"] {
            doc.add(Track::label(label));
            push(&mut history, &doc, label);
        }
        assert_eq!(history.set_state_to(0).tracks().len(), 1);
        assert_eq!(history.current_index(), Some(0));
        assert!(history.redo_available());
    }

    #[test]
    fn test_pruning_keeps_blocks_of_surviving_states() {
        let (mut history, store) = history();
        let shared = store.create_block(vec![0.0_f32; 8]);
        let doc = TrackDocument::new();
        doc.add(wave_with(&[&shared]));

        for label in ["S0", "S1", "S2"] {
            push(&mut history, &doc, label);
        }
        history.remove_old_states(1);

        assert_eq!(history.len(), 2);
        assert!(store.contains(shared.id()));
        assert_eq!(history.current_index(), Some(1));
    }

    #[test]
    fn test_pruning_deletes_unreferenced_blocks() {
        let (mut history, store) = history();
        let doc = TrackDocument::new();
        let id = doc.add(Track::wave("Audio", 44100));
        push(&mut history, &doc, "S0");

        let recorded = store.create_block(vec![0.0_f32; 8]);
        doc.replace(id, wave_with(&[&recorded])).unwrap();
        push(&mut history, &doc, "S1");
        doc.replace(id, Track::wave("Audio", 44100)).unwrap();

        history.undo();
        history.abandon_redo();
        assert_eq!(history.len(), 1);
        assert!(!store.contains(recorded.id()));
    }

    #[test]
    fn test_push_after_undo_keeps_blocks_of_new_state() {
        let (mut history, store) = history();
        let doc = TrackDocument::new();
        let id = doc.add(Track::wave("Audio", 44100));
        push(&mut history, &doc, "S0");
        push(&mut history, &doc, "S1");
        history.undo();

        let recorded = store.create_block(vec![0.0_f32; 8]);
        doc.replace(id, wave_with(&[&recorded])).unwrap();
        push(&mut history, &doc, "Record");

        assert_eq!(history.len(), 2);
        assert_eq!(history.current_index(), Some(1));
        assert!(store.contains(recorded.id()));
    }

    #[test]
    fn test_pruning_retains_clipboard_blocks() {
        let store = Arc::new(MemoryBlockStore::new());
        let clipboard = Arc::new(Clipboard::new());
        let mut history = HistoryManager::new(store.clone()).with_clipboard(clipboard.clone());

        let block = store.create_block(vec![0.0_f32; 4]);
        let doc = TrackDocument::new();
        doc.add(wave_with(&[&block]));
        push(&mut history, &doc, "S0");
        clipboard.assign(&doc, SelectedRegion::default());

        history.clear_states();
        assert!(history.is_empty());
        assert_eq!(history.current_index(), None);
        assert!(store.contains(block.id()));
    }

    #[test]
    fn test_store_failure_is_tolerated() {
        struct FailingStore;
        impl BlockStore for FailingStore {
            fn delete_blocks_except(&self, _: &BlockIdSet) -> Result<usize, StoreError> {
                Err(StoreError::Unavailable("disk gone".into()))
            }
        }

        let mut history = HistoryManager::new(Arc::new(FailingStore));
        let doc = TrackDocument::new();
        push(&mut history, &doc, "S0");
        push(&mut history, &doc, "S1");
        history.remove_old_states(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.current_index(), Some(0));
    }

    #[test]
    #[should_panic(expected = "current history state")]
    fn test_removing_current_state_panics() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        push(&mut history, &doc, "S0");
        push(&mut history, &doc, "S1");
        history.remove_states(1, 2);
    }

    #[test]
    fn test_max_states() {
        let store = Arc::new(MemoryBlockStore::new());
        let mut history = HistoryManager::new(store).with_config(HistoryConfig {
            max_states: Some(3),
        });
        let doc = TrackDocument::new();
        for i in 0..5 {
            push(&mut history, &doc, &format!("Action {}", i));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.current_index(), Some(2));
        assert_eq!(history.short_description(0), Some("Action 2"));
    }

    #[test]
    fn test_space_usage_attributed_to_newest_state() {
        let (mut history, store) = history();
        let old = store.create_block(vec![0.0_f32; 10]);
        let new = store.create_block(vec![0.0_f32; 5]);
        let doc = TrackDocument::new();
        let id = doc.add(wave_with(&[&old]));
        push(&mut history, &doc, "S0");
        doc.replace(id, wave_with(&[&old, &new])).unwrap();
        push(&mut history, &doc, "S1");

        history.calculate_space_usage();
        assert_eq!(history.space_usage(0), 0);
        assert_eq!(history.space_usage(1), 60);
        assert_eq!(history.long_description(1), Some(("S1", 60)));
        assert_eq!(history.clipboard_space_usage(), 0);
    }

    #[test]
    fn test_descriptions() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        history.push_state(
            &doc,
            SelectedRegion::default(),
            Vec::new(),
            "Amplify by 3 dB",
            "Amplify",
            false,
        );

        history.set_long_description(0, "Amplify by 6 dB");
        assert_eq!(history.long_description(0).map(|(d, _)| d), Some("Amplify by 6 dB"));
        assert_eq!(history.short_description(0), Some("Amplify"));

        history.rename_state(0, "Normalize", "Norm");
        assert_eq!(history.short_description(0), Some("Norm"));
        assert_eq!(history.long_description(5), None);
    }

    #[test]
    fn test_visit_states() {
        let (mut history, _) = history();
        let doc = TrackDocument::new();
        for label in ["A", "B", "C"] {
            push(&mut history, &doc, label);
        }

        let mut order = Vec::new();
        history.visit_states(true, |n, _| order.push(n));
        assert_eq!(order, vec![2, 1, 0]);

        order.clear();
        history.visit_states(false, |n, _| order.push(n));
        assert_eq!(order, vec![0, 1, 2]);

        order.clear();
        history.visit_range(2, 0, |n, _| order.push(n));
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_events() {
        let (mut history, _) = history();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        history.subscribe(move |e| sink.lock().push(*e));

        let doc = TrackDocument::new();
        push(&mut history, &doc, "A");
        push(&mut history, &doc, "B");
        history.undo();
        history.set_state_to(1);
        history.remove_old_states(1);

        assert_eq!(
            *seen.lock(),
            vec![
                HistoryEvent::Pushed,
                HistoryEvent::Pushed,
                HistoryEvent::UndoOrRedo,
                HistoryEvent::Reset,
                HistoryEvent::BeginPurge { begin: 0, end: 1 },
                HistoryEvent::EndPurge,
            ]
        );
    }

    #[test]
    fn test_inspect_blocks_collects_ids() {
        let block = SampleBlock::new(BlockId::new(3), vec![1.0_f32]);
        let mut seen = BlockIdSet::new();
        let doc = TrackDocument::new();
        let mut track = Track::wave("W", 44100);
        track.as_wave_mut().unwrap().append_block(Arc::new(block));
        doc.add(track);
        inspect_blocks(&doc, |_| {}, &mut seen);
        assert!(seen.contains(&BlockId::new(3)));
    }
}
