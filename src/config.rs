use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::track::{DEFAULT_TRACK_HEIGHT, MINIMIZED_TRACK_HEIGHT};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub history: HistoryConfig,
    pub tracks: TrackConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Oldest states are pruned once the stack grows past this. `None`
    /// keeps everything.
    pub max_states: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub default_height: u32,
    pub minimized_height: u32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            default_height: DEFAULT_TRACK_HEIGHT,
            minimized_height: MINIMIZED_TRACK_HEIGHT,
        }
    }
}

impl Config {
    /// Reads the config at `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
