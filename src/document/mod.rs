//! The ordered track collection of one project version.
//!
//! A [`TrackDocument`] owns its tracks, keeps their derived positions up to
//! date, enforces the channel-pairing invariant, and stages changes proposed
//! by a background thread until the foreground thread folds them in.

mod arena;
mod events;
mod pending;

pub use events::{DataChange, DocumentEvent, SubscriptionId};
pub use pending::{recording_updater, updater, CommitOutcome, SharedTrack, Updater};

pub(crate) use events::Subscribers;

use crate::error::DocumentError;
use crate::track::{Track, TrackId, TrackIdSource, TrackKind};
use arena::{Handle, TrackList};
use parking_lot::Mutex;
use pending::{PendingEntry, PendingSource, PendingUpdates};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// An ordered, mutable collection of tracks.
///
/// All methods take `&self`: structural changes lock the track list for the
/// duration of the operation only, and subscribers are notified after the
/// lock is released.
pub struct TrackDocument {
    ids: TrackIdSource,
    list: Mutex<TrackList>,
    pending: Mutex<PendingUpdates>,
    subscribers: Subscribers<DocumentEvent>,
}

impl TrackDocument {
    /// Creates an empty document with its own id source.
    pub fn new() -> Self {
        Self::with_id_source(TrackIdSource::new())
    }

    fn with_id_source(ids: TrackIdSource) -> Self {
        Self {
            ids,
            list: Mutex::new(TrackList::new()),
            pending: Mutex::new(PendingUpdates::default()),
            subscribers: Subscribers::new(),
        }
    }

    /// The allocator this document draws track ids from.
    pub fn id_source(&self) -> &TrackIdSource {
        &self.ids
    }

    /// Runs `f` with the list locked, then delivers the events it collected.
    fn mutate<R>(&self, f: impl FnOnce(&mut TrackList, &mut Vec<DocumentEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut list = self.list.lock();
            f(&mut list, &mut events)
        };
        self.subscribers.notify(&events);
        result
    }

    fn position_of(list: &TrackList, id: TrackId) -> Result<usize, DocumentError> {
        list.find(id)
            .and_then(|h| list.position(h))
            .ok_or(DocumentError::NotFound(id))
    }

    // ---- Queries ----

    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.list.lock().find(id).is_some()
    }

    /// Returns a copy of track `id`.
    pub fn get(&self, id: TrackId) -> Option<Track> {
        let list = self.list.lock();
        list.find(id).and_then(|h| list.get(h)).cloned()
    }

    /// Copies of every track in display order, provisional ones included.
    pub fn tracks(&self) -> Vec<Track> {
        self.list.lock().iter().cloned().collect()
    }

    /// Ids of the confirmed tracks in display order.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.list
            .lock()
            .iter()
            .map(Track::id)
            .filter(TrackId::is_assigned)
            .collect()
    }

    /// Calls `f` on every track in display order without copying them.
    ///
    /// The document is locked while `f` runs; `f` must not call back into
    /// this document.
    pub fn for_each_track(&self, mut f: impl FnMut(&Track)) {
        for track in self.list.lock().iter() {
            f(track);
        }
    }

    /// Id of the first channel of the group containing `id`.
    pub fn find_leader(&self, id: TrackId) -> Option<TrackId> {
        let list = self.list.lock();
        let pos = Self::position_of(&list, id).ok()?;
        list.at(list.leader_position(pos)).map(Track::id)
    }

    /// Ids of every channel in the group containing `id`, leader first.
    pub fn channels(&self, id: TrackId) -> Vec<TrackId> {
        let list = self.list.lock();
        match Self::position_of(&list, id) {
            Ok(pos) => list
                .group_range(pos)
                .filter_map(|p| list.at(p))
                .map(Track::id)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Display height of the whole group containing `id`.
    pub fn group_height(&self, id: TrackId) -> u32 {
        let list = self.list.lock();
        match Self::position_of(&list, id) {
            Ok(pos) => list.group_range(pos).map(|p| list.effective_height(p)).sum(),
            Err(_) => 0,
        }
    }

    /// Height of all tracks stacked.
    pub fn total_height(&self) -> u32 {
        let list = self.list.lock();
        match list.len().checked_sub(1) {
            Some(last) => list.at(last).map_or(0, Track::y) + list.effective_height(last),
            None => 0,
        }
    }

    pub fn can_move_up(&self, id: TrackId) -> bool {
        let list = self.list.lock();
        Self::position_of(&list, id).is_ok_and(|pos| list.group_range(pos).start > 0)
    }

    pub fn can_move_down(&self, id: TrackId) -> bool {
        let list = self.list.lock();
        Self::position_of(&list, id).is_ok_and(|pos| list.group_range(pos).end < list.len())
    }

    // ---- Structural operations ----

    /// Appends `track` and returns its id.
    ///
    /// A track keeps the id it carries unless it has none or the id is
    /// already taken in this document; then it gets a fresh one.
    pub fn add(&self, mut track: Track) -> TrackId {
        self.mutate(|list, events| {
            let id = self.claim_id(list, track.id());
            track.set_id(id);
            track.set_linked(false);
            list.push(track);
            list.recalc_positions(list.len() - 1);
            events.push(DocumentEvent::Added(id));
            id
        })
    }

    /// Appends `tracks` as one channel group.
    pub fn add_channels(&self, tracks: Vec<Track>) -> Vec<TrackId> {
        self.mutate(|list, events| {
            let start = list.len();
            let ids: Vec<TrackId> = tracks
                .into_iter()
                .map(|mut track| {
                    let id = self.claim_id(list, track.id());
                    track.set_id(id);
                    track.set_linked(false);
                    list.push(track);
                    id
                })
                .collect();
            if ids.len() > 1 {
                if let Some(leader) = list.at_mut(start) {
                    leader.set_linked(true);
                }
            }
            list.recalc_positions(start);
            events.extend(ids.iter().copied().map(DocumentEvent::Added));
            ids
        })
    }

    fn claim_id(&self, list: &TrackList, id: TrackId) -> TrackId {
        if id.is_assigned() && list.find(id).is_none() {
            self.ids.observe(id);
            id
        } else {
            self.ids.next_id()
        }
    }

    /// Detaches track `id` and hands it back to the caller.
    ///
    /// Removing the second channel of a pair also clears the leader's link.
    pub fn remove(&self, id: TrackId) -> Result<Track, DocumentError> {
        self.mutate(|list, events| {
            let handle = list.find(id).ok_or(DocumentError::NotFound(id))?;
            let pos = list.position(handle).ok_or(DocumentError::NotFound(id))?;
            if let Some(prev) = pos.checked_sub(1).and_then(|p| list.at_mut(p)) {
                prev.set_linked(false);
            }
            let mut track = list.remove(handle).ok_or(DocumentError::NotFound(id))?;
            track.set_linked(false);
            track.set_position(0, 0);
            list.recalc_positions(pos.saturating_sub(1));
            events.push(DocumentEvent::Removed(id));
            Ok(track)
        })
    }

    /// Swaps track `id` for `track` in place.
    ///
    /// The replacement takes over the id, position, and link flag of the
    /// track it replaces.
    ///
    /// # Returns
    ///
    /// The replaced track
    pub fn replace(&self, id: TrackId, mut track: Track) -> Result<Track, DocumentError> {
        self.mutate(|list, events| {
            let handle = list.find(id).ok_or(DocumentError::NotFound(id))?;
            let pos = list.position(handle).ok_or(DocumentError::NotFound(id))?;
            if let Some(old) = list.get(handle) {
                track.set_linked(old.is_linked());
            }
            track.set_id(id);
            let old = list.put(handle, track).ok_or(DocumentError::NotFound(id))?;
            list.recalc_positions(pos);
            events.push(DocumentEvent::Removed(id));
            events.push(DocumentEvent::Added(id));
            Ok(old)
        })
    }

    /// Makes the `group_size` tracks starting at `start` one channel group.
    ///
    /// Any group `start` belonged to is dissolved first. A size of 1 just
    /// ungroups. Only pairs are linked; tracks past the second channel of a
    /// larger run are left standalone.
    ///
    /// # Errors
    ///
    /// `NotFound` if `start` is not in the document. `InconsistentGrouping`
    /// if fewer than `group_size` tracks remain from `start`; this is a
    /// caller bug and panics in debug builds.
    pub fn group_channels(&self, start: TrackId, group_size: usize) -> Result<(), DocumentError> {
        self.mutate(|list, events| {
            let pos = Self::position_of(list, start)?;
            let available = list.len() - pos;
            let consistent = group_size > 0 && group_size <= available;
            if !consistent {
                error!(
                    track = %start,
                    group_size,
                    available,
                    "Inconsistent channel grouping"
                );
            }
            debug_assert!(
                consistent,
                "cannot group {group_size} channels at {start}: {available} available"
            );
            if !consistent {
                return Err(DocumentError::InconsistentGrouping {
                    track: start,
                    group_size,
                    available,
                });
            }

            let leader = list.leader_position(pos);
            let mut changed = Vec::new();
            if leader != pos {
                if let Some(track) = list.at_mut(leader) {
                    track.set_linked(false);
                    changed.push(track.id());
                }
            }
            for p in pos..pos + group_size {
                let linked = p == pos && group_size > 1;
                if let Some(track) = list.at_mut(p) {
                    if track.is_linked() != linked {
                        track.set_linked(linked);
                        changed.push(track.id());
                    }
                }
            }
            list.recalc_positions(leader);
            events.extend(changed.into_iter().map(DocumentEvent::Resized));
            Ok(())
        })
    }

    /// Reorders the tracks.
    ///
    /// Each listed track brings its whole channel group along, so a pair is
    /// never split. Tracks not listed keep their relative order after the
    /// listed ones.
    pub fn permute(&self, order: &[TrackId]) -> Result<(), DocumentError> {
        self.mutate(|list, events| {
            let mut placed = HashSet::new();
            let mut handles = Vec::with_capacity(list.len());
            for &id in order {
                let pos = Self::position_of(list, id)?;
                for p in list.group_range(pos) {
                    if let Some(handle) = list.handle_at(p) {
                        if placed.insert(handle) {
                            handles.push(handle);
                        }
                    }
                }
            }
            let rest: Vec<Handle> = list
                .handles()
                .iter()
                .copied()
                .filter(|h| !placed.contains(h))
                .collect();
            handles.extend(rest);
            list.set_order(handles);
            list.recalc_positions(0);
            events.push(DocumentEvent::Permuted);
            Ok(())
        })
    }

    /// Swaps the group containing `id` with the group above it.
    ///
    /// # Returns
    ///
    /// `false` if the group is already first
    pub fn move_up(&self, id: TrackId) -> Result<bool, DocumentError> {
        self.mutate(|list, events| {
            let group = list.group_range(Self::position_of(list, id)?);
            if group.start == 0 {
                return Ok(false);
            }
            let above = list.group_range(group.start - 1);
            list.order_mut()[above.start..group.end].rotate_left(above.len());
            list.recalc_positions(above.start);
            events.push(DocumentEvent::Permuted);
            Ok(true)
        })
    }

    /// Swaps the group containing `id` with the group below it.
    pub fn move_down(&self, id: TrackId) -> Result<bool, DocumentError> {
        self.mutate(|list, events| {
            let group = list.group_range(Self::position_of(list, id)?);
            if group.end >= list.len() {
                return Ok(false);
            }
            let below = list.group_range(group.end);
            list.order_mut()[group.start..below.end].rotate_left(group.len());
            list.recalc_positions(group.start);
            events.push(DocumentEvent::Permuted);
            Ok(true)
        })
    }

    /// Removes every track, provisional ones included, and drops staged
    /// changes.
    pub fn clear(&self) -> Vec<Track> {
        self.pending.lock().take();
        self.mutate(|list, events| {
            let tracks = list.clear();
            events.extend(
                tracks
                    .iter()
                    .map(Track::id)
                    .filter(TrackId::is_assigned)
                    .map(DocumentEvent::Removed),
            );
            tracks
        })
    }

    // ---- Attributes ----

    pub fn set_name(&self, id: TrackId, name: impl Into<String>) -> Result<(), DocumentError> {
        let name = name.into();
        self.mutate(|list, events| {
            let handle = list.find(id).ok_or(DocumentError::NotFound(id))?;
            if let Some(track) = list.get_mut(handle) {
                track.set_name(name);
                events.push(DocumentEvent::DataChanged(id, DataChange::Name));
            }
            Ok(())
        })
    }

    pub fn set_selected(&self, id: TrackId, selected: bool) -> Result<(), DocumentError> {
        self.mutate(|list, events| {
            let handle = list.find(id).ok_or(DocumentError::NotFound(id))?;
            if let Some(track) = list.get_mut(handle) {
                if track.is_selected() != selected {
                    track.set_selected(selected);
                    events.push(DocumentEvent::SelectionChanged(id));
                }
            }
            Ok(())
        })
    }

    pub fn set_height(&self, id: TrackId, height: u32) -> Result<(), DocumentError> {
        self.mutate(|list, events| {
            let pos = Self::position_of(list, id)?;
            if let Some(track) = list.at_mut(pos) {
                track.set_height(height);
            }
            list.recalc_positions(pos);
            events.push(DocumentEvent::Resized(id));
            Ok(())
        })
    }

    /// Minimizes or restores the whole group containing `id`.
    pub fn set_minimized(&self, id: TrackId, minimized: bool) -> Result<(), DocumentError> {
        self.mutate(|list, events| {
            let group = list.group_range(Self::position_of(list, id)?);
            let start = group.start;
            for p in group {
                if let Some(track) = list.at_mut(p) {
                    track.set_minimized(minimized);
                    events.push(DocumentEvent::Resized(track.id()));
                }
            }
            list.recalc_positions(start);
            Ok(())
        })
    }

    /// Height shared by the channels of a minimized group.
    pub fn set_minimized_height(&self, height: u32) {
        self.mutate(|list, _| {
            list.set_minimized_height(height);
            list.recalc_positions(0);
        })
    }

    /// Edits the content of track `id` in place.
    pub fn update_content<R>(
        &self,
        id: TrackId,
        f: impl FnOnce(&mut TrackKind) -> R,
    ) -> Result<R, DocumentError> {
        self.mutate(|list, events| {
            let handle = list.find(id).ok_or(DocumentError::NotFound(id))?;
            let track = list.get_mut(handle).ok_or(DocumentError::NotFound(id))?;
            let result = f(track.kind_mut());
            events.push(DocumentEvent::DataChanged(id, DataChange::Content));
            Ok(result)
        })
    }

    // ---- Pending updates ----

    /// Stages a shadow copy of track `id` for a thread that does not own
    /// the document.
    ///
    /// # Arguments
    ///
    /// * `id` - The live track the shadow stands for
    /// * `updater` - Folds the shadow's authoritative fields into the live
    ///   track during reconciliation
    ///
    /// # Returns
    ///
    /// The shadow, which the caller may write to at any time
    pub fn register_pending_change(
        &self,
        id: TrackId,
        updater: Updater,
    ) -> Result<SharedTrack, DocumentError> {
        let mut pending = self.pending.lock();
        if pending.contains(id) {
            return Err(DocumentError::AlreadyStaged(id));
        }
        let track = self.get(id).ok_or(DocumentError::NotFound(id))?;
        let shadow = Arc::new(Mutex::new(track));
        pending.push(PendingEntry {
            source: PendingSource::Live(id),
            shadow: Arc::clone(&shadow),
            updater,
        });
        debug!(track = %id, staged = pending.len(), "Registered pending change");
        Ok(shadow)
    }

    /// Appends `track` as a provisional track and stages a shadow for it.
    ///
    /// A provisional track has no id: it is visible in the document but is
    /// left out of duplicates until [`commit_pending`](Self::commit_pending)
    /// confirms it. Subscribers hear about it on confirmation.
    pub fn register_pending_new_track(&self, mut track: Track, updater: Updater) -> SharedTrack {
        track.set_id(TrackId::UNASSIGNED);
        track.set_linked(false);
        let shadow = Arc::new(Mutex::new(track.clone()));
        let handle = self.mutate(|list, _| {
            let handle = list.push(track);
            list.recalc_positions(list.len() - 1);
            handle
        });
        let mut pending = self.pending.lock();
        pending.push(PendingEntry {
            source: PendingSource::Provisional(handle),
            shadow: Arc::clone(&shadow),
            updater,
        });
        debug!(staged = pending.len(), "Registered provisional track");
        shadow
    }

    /// The staged shadow of track `id`, for display while it is in flight.
    pub fn substitute_pending(&self, id: TrackId) -> Option<SharedTrack> {
        self.pending.lock().shadow_of(id)
    }

    /// Returns true if changes are staged.
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Returns true if the document holds provisional tracks.
    pub fn has_pending_tracks(&self) -> bool {
        self.list.lock().iter().any(|t| !t.id().is_assigned())
    }

    /// Folds every staged shadow into its live track.
    ///
    /// The shadow's authoritative fields go to the live track through its
    /// updater; display fields go from the live track to the shadow. Never
    /// reorders tracks. Calling it again with no new writes to the shadows
    /// changes nothing.
    pub fn reconcile_pending(&self) {
        let entries = self.pending.lock().snapshot();
        let mut events = Vec::new();
        for (source, shadow, updater) in entries {
            let live = {
                let list = self.list.lock();
                source
                    .resolve(&list)
                    .and_then(|h| list.get(h).cloned().map(|t| (h, t)))
            };
            let Some((handle, live)) = live else {
                continue;
            };

            let mut merged = live.clone();
            {
                let mut shadow = shadow.lock();
                updater(&mut merged, &*shadow);
                shadow.copy_display_from(&live);
            }
            merged.set_id(live.id());
            merged.copy_display_from(&live);
            if merged == live {
                continue;
            }

            let id = live.id();
            self.list.lock().put(handle, merged);
            if id.is_assigned() {
                events.push(DocumentEvent::DataChanged(id, DataChange::Content));
            }
        }
        self.subscribers.notify(&events);
    }

    /// Reconciles one last time, then empties the staging area.
    ///
    /// Live tracks keep what reconciliation gave them: the fields the
    /// updater owns come from the shadow, everything else stays as the
    /// foreground left it.
    /// A shadow whose source was deleted meanwhile is appended under a new
    /// id instead of being lost. Provisional tracks receive their id.
    pub fn commit_pending(&self) -> CommitOutcome {
        self.reconcile_pending();
        let entries = self.pending.lock().take();
        if entries.is_empty() {
            return CommitOutcome::default();
        }
        let outcome = self.mutate(|list, events| {
            let mut outcome = CommitOutcome::default();
            for entry in entries {
                let Some(handle) = entry.source.resolve(list) else {
                    let mut track = entry.shadow.lock().clone();
                    let id = self.ids.next_id();
                    warn!(
                        track = %id,
                        name = track.name(),
                        "Source of a pending change vanished; appending the shadow"
                    );
                    track.set_id(id);
                    track.set_linked(false);
                    list.push(track);
                    events.push(DocumentEvent::Added(id));
                    outcome.reinstated.push(id);
                    continue;
                };
                // The live track already holds the reconciled shadow fields
                // along with the user's own edits.
                match entry.source {
                    PendingSource::Live(id) => outcome.replaced.push(id),
                    PendingSource::Provisional(_) => {
                        let Some(mut track) = list.get(handle).cloned() else {
                            continue;
                        };
                        let id = self.ids.next_id();
                        track.set_id(id);
                        list.put(handle, track);
                        events.push(DocumentEvent::Added(id));
                        outcome.confirmed.push(id);
                    }
                }
            }
            list.normalize_links();
            list.recalc_positions(0);
            outcome
        });
        debug!(
            replaced = outcome.replaced.len(),
            reinstated = outcome.reinstated.len(),
            confirmed = outcome.confirmed.len(),
            "Committed pending changes"
        );
        outcome
    }

    /// Drops every staged shadow without applying it and removes the
    /// provisional tracks.
    ///
    /// # Returns
    ///
    /// The provisional tracks that were removed
    pub fn discard_pending(&self) -> Vec<Track> {
        let entries = self.pending.lock().take();
        let discarded = entries.len();
        let removed = self.mutate(|list, _| {
            let removed: Vec<Track> = entries
                .iter()
                .filter_map(|entry| match entry.source {
                    PendingSource::Provisional(handle) => list.remove(handle),
                    PendingSource::Live(_) => None,
                })
                .collect();
            list.normalize_links();
            list.recalc_positions(0);
            removed
        });
        debug!(discarded, provisional = removed.len(), "Discarded pending changes");
        removed
    }

    // ---- Snapshots ----

    /// Makes an independent copy for a history snapshot.
    ///
    /// Metadata is cloned, sample blocks are shared. Provisional tracks are
    /// left out and staged changes are not carried over. The copy draws ids
    /// from the same source and has no subscribers.
    pub fn duplicate(&self) -> TrackDocument {
        let mut copy = TrackList::new();
        {
            let list = self.list.lock();
            copy.set_minimized_height(list.minimized_height());
            for track in list.iter().filter(|t| t.id().is_assigned()) {
                copy.push(track.clone());
            }
        }
        copy.normalize_links();
        copy.recalc_positions(0);
        let doc = TrackDocument::with_id_source(self.ids.clone());
        *doc.list.lock() = copy;
        doc
    }

    /// Makes this document match `other`, typically a history snapshot
    /// being adopted on undo or redo.
    ///
    /// Tracks are matched by id: missing ones are removed, differing ones
    /// replaced, new ones inserted with their ids intact. Subscribers see
    /// the corresponding events.
    pub fn restore_from(&self, other: &TrackDocument) {
        if std::ptr::eq(self, other) {
            return;
        }
        let source: Vec<Track> = other
            .tracks()
            .into_iter()
            .filter(|t| t.id().is_assigned())
            .collect();
        let wanted: HashSet<TrackId> = source.iter().map(Track::id).collect();

        self.mutate(|list, events| {
            let stale: Vec<Handle> = list
                .handles()
                .iter()
                .copied()
                .filter(|&h| list.get(h).map_or(true, |t| !wanted.contains(&t.id())))
                .collect();
            for handle in stale {
                if let Some(track) = list.remove(handle) {
                    if track.id().is_assigned() {
                        events.push(DocumentEvent::Removed(track.id()));
                    }
                }
            }

            let before: Vec<TrackId> = list.iter().map(Track::id).collect();
            let mut order = Vec::with_capacity(source.len());
            for mut track in source {
                let id = track.id();
                match list.find(id) {
                    Some(handle) => {
                        if let Some(live) = list.get(handle) {
                            track.set_position(live.index(), live.y());
                            if *live != track {
                                list.put(handle, track);
                                events.push(DocumentEvent::Removed(id));
                                events.push(DocumentEvent::Added(id));
                            }
                        }
                        order.push(handle);
                    }
                    None => {
                        self.ids.observe(id);
                        order.push(list.push(track));
                        events.push(DocumentEvent::Added(id));
                    }
                }
            }

            let kept: Vec<TrackId> = order
                .iter()
                .filter_map(|&h| list.get(h))
                .map(Track::id)
                .filter(|id| before.contains(id))
                .collect();
            list.set_order(order);
            list.recalc_positions(0);
            if kept != before {
                events.push(DocumentEvent::Permuted);
            }
        });
    }

    // ---- Notifications ----

    /// Registers `callback` for every event this document emits.
    pub fn subscribe(
        &self,
        callback: impl Fn(&DocumentEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

impl Default for TrackDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TrackDocument {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.tracks() == other.tracks()
    }
}

impl fmt::Debug for TrackDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackDocument")
            .field("tracks", &self.tracks())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}
