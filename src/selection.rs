//! Time and frequency selection stored with each history state.

use serde::{Deserialize, Serialize};

/// A selected time range, optionally narrowed to a frequency band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedRegion {
    t0: f64,
    t1: f64,
    #[serde(default)]
    f0: Option<f64>,
    #[serde(default)]
    f1: Option<f64>,
}

impl SelectedRegion {
    /// Creates a region over `[t0, t1]`, swapping the bounds if reversed.
    pub fn new(t0: f64, t1: f64) -> Self {
        let mut region = Self::default();
        region.set_times(t0, t1);
        region
    }

    /// A cursor position with no extent.
    pub fn point(t: f64) -> Self {
        Self::new(t, t)
    }

    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn t1(&self) -> f64 {
        self.t1
    }

    pub fn set_times(&mut self, t0: f64, t1: f64) {
        if t1 < t0 {
            self.t0 = t1;
            self.t1 = t0;
        } else {
            self.t0 = t0;
            self.t1 = t1;
        }
    }

    pub fn duration(&self) -> f64 {
        self.t1 - self.t0
    }

    pub fn is_point(&self) -> bool {
        self.t0 == self.t1
    }

    /// Frequency band as `(low, high)`, when one is selected.
    pub fn frequencies(&self) -> Option<(f64, f64)> {
        self.f0.zip(self.f1)
    }

    pub fn set_frequencies(&mut self, f0: f64, f1: f64) {
        let (low, high) = if f1 < f0 { (f1, f0) } else { (f0, f1) };
        self.f0 = Some(low);
        self.f1 = Some(high);
    }

    pub fn clear_frequencies(&mut self) {
        self.f0 = None;
        self.f1 = None;
    }
}
