//! Slot storage for the tracks of one document.
//!
//! Tracks sit in generation-checked slots that never move; the display
//! order is a separate vector of handles. Reordering only shuffles handles,
//! and a stale handle (its slot freed and reused) can never reach the wrong
//! track.

use crate::track::{Track, TrackId, MINIMIZED_TRACK_HEIGHT};
use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Handle {
    slot: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    track: Option<Track>,
}

#[derive(Debug)]
pub(crate) struct TrackList {
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: Vec<Handle>,
    /// Only tracks with an assigned id are indexed; provisional tracks are
    /// reachable through `order` alone.
    by_id: HashMap<TrackId, Handle>,
    minimized_height: u32,
}

impl TrackList {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            by_id: HashMap::new(),
            minimized_height: MINIMIZED_TRACK_HEIGHT,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn minimized_height(&self) -> u32 {
        self.minimized_height
    }

    pub fn set_minimized_height(&mut self, height: u32) {
        self.minimized_height = height;
    }

    pub fn get(&self, handle: Handle) -> Option<&Track> {
        self.slots
            .get(handle.slot as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.track.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Track> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.track.as_mut())
    }

    pub fn find(&self, id: TrackId) -> Option<Handle> {
        self.by_id.get(&id).copied()
    }

    pub fn position(&self, handle: Handle) -> Option<usize> {
        self.order.iter().position(|&h| h == handle)
    }

    pub fn handle_at(&self, pos: usize) -> Option<Handle> {
        self.order.get(pos).copied()
    }

    pub fn at(&self, pos: usize) -> Option<&Track> {
        self.handle_at(pos).and_then(|h| self.get(h))
    }

    pub fn at_mut(&mut self, pos: usize) -> Option<&mut Track> {
        self.handle_at(pos).and_then(|h| self.get_mut(h))
    }

    pub fn handles(&self) -> &[Handle] {
        &self.order
    }

    /// Tracks in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.order.iter().filter_map(|&h| self.get(h))
    }

    /// Stores `track` at display position `pos` (clamped to the end).
    pub fn insert(&mut self, pos: usize, track: Track) -> Handle {
        let id = track.id();
        let handle = match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.track = Some(track);
                Handle {
                    slot,
                    generation: entry.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    track: Some(track),
                });
                Handle {
                    slot: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        if id.is_assigned() {
            self.by_id.insert(id, handle);
        }
        let pos = pos.min(self.order.len());
        self.order.insert(pos, handle);
        handle
    }

    pub fn push(&mut self, track: Track) -> Handle {
        self.insert(self.order.len(), track)
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Track> {
        let pos = self.position(handle)?;
        self.order.remove(pos);
        let slot = &mut self.slots[handle.slot as usize];
        let track = slot.track.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.slot);
        self.by_id.remove(&track.id());
        Some(track)
    }

    /// Swaps the track stored under `handle`, keeping its position.
    pub fn put(&mut self, handle: Handle, track: Track) -> Option<Track> {
        let new_id = track.id();
        let old = std::mem::replace(self.get_mut(handle)?, track);
        if old.id() != new_id {
            self.by_id.remove(&old.id());
            if new_id.is_assigned() {
                self.by_id.insert(new_id, handle);
            }
        }
        Some(old)
    }

    /// Replaces the display order. `order` must contain every live handle
    /// exactly once.
    pub fn set_order(&mut self, order: Vec<Handle>) {
        debug_assert_eq!(order.len(), self.order.len());
        self.order = order;
    }

    pub fn order_mut(&mut self) -> &mut [Handle] {
        &mut self.order
    }

    pub fn clear(&mut self) -> Vec<Track> {
        let order = std::mem::take(&mut self.order);
        let tracks = order
            .into_iter()
            .filter_map(|h| self.slots[h.slot as usize].track.take())
            .collect();
        self.slots.clear();
        self.free.clear();
        self.by_id.clear();
        tracks
    }

    /// Position of the first channel of the group containing `pos`.
    pub fn leader_position(&self, pos: usize) -> usize {
        match pos.checked_sub(1).and_then(|prev| self.at(prev)) {
            Some(prev) if prev.is_linked() => pos - 1,
            _ => pos,
        }
    }

    /// Positions of every channel in the group containing `pos`.
    pub fn group_range(&self, pos: usize) -> Range<usize> {
        let leader = self.leader_position(pos);
        let linked = self.at(leader).is_some_and(Track::is_linked);
        let end = if linked && leader + 1 < self.len() {
            leader + 2
        } else {
            leader + 1
        };
        leader..end
    }

    /// Height the track at `pos` occupies on screen.
    ///
    /// A minimized group shares the minimized height between its channels.
    pub fn effective_height(&self, pos: usize) -> u32 {
        let Some(track) = self.at(pos) else {
            return 0;
        };
        if !track.is_minimized() {
            return track.height();
        }
        let group = self.group_range(pos);
        let channels = group.len() as u64;
        let channel = (pos - group.start) as u64;
        let height = u64::from(self.minimized_height);
        let share = height * (channel + 1) / channels - height * channel / channels;
        u32::try_from(share).unwrap_or(u32::MAX)
    }

    /// Recomputes `index` and `y` of every track from position `from` on.
    pub fn recalc_positions(&mut self, from: usize) {
        let mut y = match from.checked_sub(1) {
            Some(prev) => self
                .at(prev)
                .map_or(0, Track::y)
                .saturating_add(self.effective_height(prev)),
            None => 0,
        };
        for pos in from..self.len() {
            let height = self.effective_height(pos);
            if let Some(track) = self.at_mut(pos) {
                track.set_position(pos, y);
            }
            y = y.saturating_add(height);
        }
    }

    /// Clears link flags that break the pairing invariant: a link on the
    /// last track, or a link on a track that is itself a second channel.
    ///
    /// # Returns
    ///
    /// Ids of tracks whose flag was cleared
    pub fn normalize_links(&mut self) -> Vec<TrackId> {
        let mut cleared = Vec::new();
        let mut previous_linked = false;
        let len = self.len();
        for pos in 0..len {
            let Some(track) = self.at_mut(pos) else {
                continue;
            };
            if track.is_linked() && (previous_linked || pos + 1 == len) {
                track.set_linked(false);
                cleared.push(track.id());
            }
            previous_linked = track.is_linked();
        }
        cleared
    }
}
