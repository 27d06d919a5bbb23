//! Wave, label, and tempo payloads.

use crate::blocks::SampleBlock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default sample rate for new wave tracks.
pub const DEFAULT_RATE: u32 = 44100;

/// Audio content of a wave track: an ordered list of shared sample blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveData {
    /// Sample rate in Hz.
    pub rate: u32,

    /// Start of the first sample, in seconds.
    pub offset: f64,

    blocks: Vec<Arc<SampleBlock>>,
}

impl WaveData {
    pub fn new(rate: u32) -> Self {
        Self {
            rate: rate.max(1),
            offset: 0.0,
            blocks: Vec::new(),
        }
    }

    /// Appends a block to the end of the sequence.
    ///
    /// This is how a recording thread grows a track: it only ever adds
    /// blocks, never rewrites ones that snapshots may already share.
    pub fn append_block(&mut self, block: Arc<SampleBlock>) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Arc<SampleBlock>] {
        &self.blocks
    }

    /// Drops every block after the first `count`.
    pub fn truncate_blocks(&mut self, count: usize) {
        self.blocks.truncate(count);
    }

    pub fn sample_count(&self) -> u64 {
        self.blocks.iter().map(|b| b.sample_count() as u64).sum()
    }

    /// Length of the audio in seconds.
    pub fn duration(&self) -> f64 {
        self.sample_count() as f64 / self.rate as f64
    }

    pub fn end_time(&self) -> f64 {
        self.offset + self.duration()
    }
}

impl Default for WaveData {
    fn default() -> Self {
        Self::new(DEFAULT_RATE)
    }
}

/// A text annotation over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Labels of a label track, sorted by start time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelData {
    labels: Vec<Label>,
}

impl LabelData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label spanning `[start, end]`, swapping the bounds if they are
    /// reversed.
    ///
    /// # Returns
    ///
    /// The index of the new label
    pub fn add_label(&mut self, start: f64, end: f64, text: impl Into<String>) -> usize {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        let pos = self.labels.partition_point(|l| l.start <= start);
        self.labels.insert(
            pos,
            Label {
                start,
                end,
                text: text.into(),
            },
        );
        pos
    }

    pub fn remove_label(&mut self, index: usize) -> Option<Label> {
        (index < self.labels.len()).then(|| self.labels.remove(index))
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Labels that intersect `[start, end]`.
    pub fn labels_in_range(&self, start: f64, end: f64) -> impl Iterator<Item = &Label> {
        self.labels
            .iter()
            .filter(move |l| l.start <= end && l.end >= start)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A point on the tempo envelope: playback speed `ratio` at `time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub time: f64,
    pub ratio: f64,
}

/// Tempo curve of a time track.
///
/// Between points the ratio is interpolated linearly; before the first and
/// after the last point it is held constant. An empty envelope plays at
/// `default_ratio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoData {
    pub default_ratio: f64,
    points: Vec<TempoPoint>,
}

impl TempoData {
    pub fn new() -> Self {
        Self {
            default_ratio: 1.0,
            points: Vec::new(),
        }
    }

    /// Inserts a point, replacing any existing point at the same time.
    pub fn insert_point(&mut self, time: f64, ratio: f64) {
        let ratio = ratio.max(f64::EPSILON);
        match self.points.binary_search_by(|p| p.time.total_cmp(&time)) {
            Ok(pos) => self.points[pos].ratio = ratio,
            Err(pos) => self.points.insert(pos, TempoPoint { time, ratio }),
        }
    }

    pub fn points(&self) -> &[TempoPoint] {
        &self.points
    }

    /// Speed ratio at time `t`.
    pub fn ratio_at(&self, t: f64) -> f64 {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return self.default_ratio,
        };
        if t <= first.time {
            return first.ratio;
        }
        if t >= last.time {
            return last.ratio;
        }
        let next = self.points.partition_point(|p| p.time <= t);
        let (a, b) = (self.points[next - 1], self.points[next]);
        let span = b.time - a.time;
        if span <= 0.0 {
            return b.ratio;
        }
        a.ratio + (b.ratio - a.ratio) * (t - a.time) / span
    }

    /// Warped position of time `t`: the integral of the ratio over `[0, t]`.
    pub fn warp(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        // Breakpoints of the piecewise-linear ratio inside (0, t)
        let mut edges: Vec<f64> = vec![0.0];
        edges.extend(
            self.points
                .iter()
                .map(|p| p.time)
                .filter(|&time| time > 0.0 && time < t),
        );
        edges.push(t);

        edges
            .windows(2)
            .map(|w| (w[1] - w[0]) * (self.ratio_at(w[0]) + self.ratio_at(w[1])) / 2.0)
            .sum()
    }
}

impl Default for TempoData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockId;

    #[test]
    fn test_wave_duration() {
        let mut wave = WaveData::new(100);
        wave.append_block(Arc::new(SampleBlock::new(BlockId::new(1), vec![0.0_f32; 50])));
        wave.append_block(Arc::new(SampleBlock::new(BlockId::new(2), vec![0.0_f32; 150])));
        wave.offset = 1.0;

        assert_eq!(wave.sample_count(), 200);
        assert_eq!(wave.duration(), 2.0);
        assert_eq!(wave.end_time(), 3.0);

        wave.truncate_blocks(1);
        assert_eq!(wave.sample_count(), 50);
    }

    #[test]
    fn test_labels_sorted_and_normalized() {
        let mut labels = LabelData::new();
        labels.add_label(5.0, 6.0, "b");
        labels.add_label(2.0, 1.0, "a");

        assert_eq!(labels.labels()[0].text, "a");
        assert_eq!(labels.labels()[0].start, 1.0);
        assert_eq!(labels.labels()[0].end, 2.0);
        assert_eq!(labels.labels_in_range(1.5, 5.5).count(), 2);
        assert_eq!(labels.labels_in_range(3.0, 4.0).count(), 0);
    }

    #[test]
    fn test_tempo_interpolation() {
        let mut tempo = TempoData::new();
        assert_eq!(tempo.ratio_at(3.0), 1.0);

        tempo.insert_point(0.0, 1.0);
        tempo.insert_point(2.0, 2.0);
        assert_eq!(tempo.ratio_at(1.0), 1.5);
        assert_eq!(tempo.ratio_at(5.0), 2.0);

        tempo.insert_point(2.0, 3.0);
        assert_eq!(tempo.points().len(), 2);
        assert_eq!(tempo.ratio_at(2.0), 3.0);
    }

    #[test]
    fn test_tempo_warp() {
        let mut tempo = TempoData::new();
        assert_eq!(tempo.warp(4.0), 4.0);

        tempo.insert_point(0.0, 1.0);
        tempo.insert_point(2.0, 3.0);
        // Trapezoid from 1.0 to 3.0 over two seconds, then flat at 3.0
        assert_eq!(tempo.warp(2.0), 4.0);
        assert_eq!(tempo.warp(3.0), 7.0);
    }
}
