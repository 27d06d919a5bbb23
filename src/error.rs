//! Error types.

use crate::track::TrackId;
use thiserror::Error;

/// Failures of track document operations.
///
/// `NotFound` is an expected race (a background task referring to a track
/// the user just deleted) and is always recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("track {0} not found")]
    NotFound(TrackId),

    #[error("track {0} already has a pending change")]
    AlreadyStaged(TrackId),

    #[error("cannot group {group_size} channels starting at track {track}: only {available} available")]
    InconsistentGrouping {
        track: TrackId,
        group_size: usize,
        available: usize,
    },
}

/// Failures reported by a block store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to delete {failed} of {requested} blocks")]
    Partial { failed: usize, requested: usize },
}

/// Failures reading or writing a project file.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Binary(#[from] bincode::Error),

    #[error("nothing to save: history is empty")]
    EmptyHistory,
}

/// Failures running a scripted session.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("no track at position {0}")]
    NoTrackAt(usize),

    #[error("{0} is not available")]
    Unavailable(&'static str),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("invalid script: {0}")]
    Parse(#[from] serde_json::Error),
}
