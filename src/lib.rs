//! trackhistory - Track documents and snapshot-based undo/redo for audio
//! editing projects.
//!
//! A [`TrackDocument`] is an ordered list of tracks with channel grouping.
//! The [`HistoryManager`] keeps immutable copies of it as undo states,
//! sharing sample blocks between states and reclaiming them from the
//! [`BlockStore`] when states are pruned. Background producers such as a
//! recording thread stage their edits as pending updates that the editing
//! thread folds in each tick and commits as a single undo step.

pub mod blocks;
pub mod clipboard;
pub mod config;
pub mod document;
pub mod error;
pub mod history;
pub mod project;
pub mod script;
pub mod selection;
pub mod track;

// Re-export commonly used types
pub use blocks::{BlockId, BlockStore, MemoryBlockStore, SampleBlock};
pub use config::Config;
pub use document::{CommitOutcome, DocumentEvent, TrackDocument};
pub use error::{DocumentError, PersistError, ScriptError, StoreError};
pub use history::{HistoryEvent, HistoryManager, HistoryState, StateExtension, Tags};
pub use project::{Project, ProjectFile};
pub use selection::SelectedRegion;
pub use track::{Track, TrackId, TrackKind};
