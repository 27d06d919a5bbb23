//! Note track payload.
//!
//! A note track holds a list of pitched events positioned in seconds.
//! Events are kept sorted by start time so range queries and rendering can
//! walk them in order.

use serde::{Deserialize, Serialize};

/// A single pitched note event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI note number (0-127). 60 = Middle C (C4).
    pub pitch: u8,

    /// Note velocity (0-127).
    pub velocity: u8,

    /// Start time in seconds from the beginning of the track.
    pub start: f64,

    /// Duration in seconds.
    pub duration: f64,
}

impl Note {
    /// Creates a new note, clamping pitch and velocity to the MIDI range and
    /// negative times to zero.
    pub fn new(pitch: u8, velocity: u8, start: f64, duration: f64) -> Self {
        Self {
            pitch: pitch.min(127),
            velocity: velocity.min(127),
            start: start.max(0.0),
            duration: duration.max(0.0),
        }
    }

    /// Returns the end time of this note (start + duration).
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Checks if this note overlaps the half-open range `[start, end)`.
    pub fn overlaps_range(&self, start: f64, end: f64) -> bool {
        self.start < end && self.end() > start
    }

    /// Transposes the note by a number of semitones.
    ///
    /// Returns false (and leaves the pitch unchanged) when the result would
    /// leave the 0-127 range.
    pub fn transpose(&mut self, semitones: i8) -> bool {
        let new_pitch = self.pitch as i16 + semitones as i16;
        if (0..=127).contains(&new_pitch) {
            self.pitch = new_pitch as u8;
            true
        } else {
            false
        }
    }
}

/// Sorted collection of notes belonging to one note track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteData {
    notes: Vec<Note>,
}

impl NoteData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a note, keeping the collection sorted by start time.
    ///
    /// # Returns
    ///
    /// The index the note was inserted at
    pub fn add_note(&mut self, note: Note) -> usize {
        // Notes with equal start times keep insertion order.
        let pos = self.notes.partition_point(|n| n.start <= note.start);
        self.notes.insert(pos, note);
        pos
    }

    /// Removes the note at `index`, if any.
    pub fn remove_note(&mut self, index: usize) -> Option<Note> {
        (index < self.notes.len()).then(|| self.notes.remove(index))
    }

    /// Removes every note that starts inside `[start, end)`.
    ///
    /// # Returns
    ///
    /// Number of notes removed
    pub fn clear_range(&mut self, start: f64, end: f64) -> usize {
        let before = self.notes.len();
        self.notes.retain(|n| n.start < start || n.start >= end);
        before - self.notes.len()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Returns notes overlapping the half-open range `[start, end)`.
    pub fn notes_in_range(&self, start: f64, end: f64) -> impl Iterator<Item = &Note> {
        self.notes
            .iter()
            .take_while(move |n| n.start < end)
            .filter(move |n| n.overlaps_range(start, end))
    }

    /// End time of the last sounding note, or zero for an empty track.
    pub fn end_time(&self) -> f64 {
        self.notes.iter().map(Note::end).fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Snaps every note start to the nearest multiple of `grid` seconds.
    pub fn quantize(&mut self, grid: f64) {
        if grid <= 0.0 {
            return;
        }
        for note in &mut self.notes {
            note.start = (note.start / grid).round() * grid;
        }
        // Quantizing can reorder notes that were closer than half a grid step
        self.notes.sort_by(|a, b| a.start.total_cmp(&b.start));
    }

    /// Transposes all notes by a number of semitones.
    ///
    /// # Returns
    ///
    /// Number of notes that couldn't be transposed (out of range)
    pub fn transpose_all(&mut self, semitones: i8) -> usize {
        let mut failed = 0;
        for note in &mut self.notes {
            if !note.transpose(semitones) {
                failed += 1;
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_clamping() {
        let note = Note::new(200, 200, -1.0, 0.5);
        assert_eq!(note.pitch, 127);
        assert_eq!(note.velocity, 127);
        assert_eq!(note.start, 0.0);
    }

    #[test]
    fn test_note_overlap() {
        let note = Note::new(60, 100, 1.0, 2.0); // 1.0-3.0
        assert!(note.overlaps_range(0.0, 1.5));
        assert!(note.overlaps_range(2.0, 4.0));
        assert!(!note.overlaps_range(0.0, 1.0));
        assert!(!note.overlaps_range(3.0, 4.0));
    }

    #[test]
    fn test_add_notes_sorted() {
        let mut data = NoteData::new();
        data.add_note(Note::new(60, 100, 1.0, 0.5));
        data.add_note(Note::new(62, 100, 0.0, 0.5));
        data.add_note(Note::new(64, 100, 2.0, 0.5));

        let starts: Vec<f64> = data.notes().iter().map(|n| n.start).collect();
        assert_eq!(starts, vec![0.0, 1.0, 2.0]);
        assert_eq!(data.end_time(), 2.5);
    }

    #[test]
    fn test_notes_in_range_and_clear() {
        let mut data = NoteData::new();
        data.add_note(Note::new(60, 100, 0.0, 1.0));
        data.add_note(Note::new(62, 100, 1.0, 1.0));
        data.add_note(Note::new(64, 100, 2.0, 1.0));

        assert_eq!(data.notes_in_range(0.5, 1.5).count(), 2);
        assert_eq!(data.clear_range(1.0, 3.0), 2);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_transpose_all() {
        let mut data = NoteData::new();
        data.add_note(Note::new(60, 100, 0.0, 1.0));
        data.add_note(Note::new(120, 100, 1.0, 1.0));

        assert_eq!(data.transpose_all(12), 1);
        assert_eq!(data.notes()[0].pitch, 72);
        assert_eq!(data.notes()[1].pitch, 120);
    }

    #[test]
    fn test_quantize() {
        let mut data = NoteData::new();
        data.add_note(Note::new(60, 100, 0.26, 0.1));
        data.add_note(Note::new(62, 100, 0.74, 0.1));
        data.quantize(0.5);
        assert_eq!(data.notes()[0].start, 0.5);
        assert_eq!(data.notes()[1].start, 0.5);
    }
}
