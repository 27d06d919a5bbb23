//! Scripted editing sessions.
//!
//! A script is a JSON array of commands run in order against a project,
//! e.g.
//!
//! ```json
//! [
//!   {"op": "add_wave", "name": "Vocals", "samples": 44100, "stereo": true},
//!   {"op": "push", "description": "Import Vocals"},
//!   {"op": "remove", "track": 0},
//!   {"op": "push", "description": "Delete Track"},
//!   {"op": "undo"}
//! ]
//! ```
//!
//! Tracks are addressed by display position. After the run,
//! [`HistoryReport`] describes the history stack and the live tracks.

use crate::blocks::MemoryBlockStore;
use crate::document::recording_updater;
use crate::error::ScriptError;
use crate::project::Project;
use crate::selection::SelectedRegion;
use crate::track::{Label, LabelData, Note, NoteData, TrackId, TrackKind, WaveData, DEFAULT_RATE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

fn default_rate() -> u32 {
    DEFAULT_RATE
}

/// One step of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptCommand {
    /// Adds a wave track holding `samples` of silence; two grouped channels
    /// when `stereo` is set.
    AddWave {
        name: String,
        #[serde(default = "default_rate")]
        rate: u32,
        #[serde(default)]
        samples: usize,
        #[serde(default)]
        stereo: bool,
    },
    AddNote {
        name: String,
        #[serde(default)]
        notes: Vec<Note>,
    },
    AddLabel {
        name: String,
        #[serde(default)]
        labels: Vec<Label>,
    },
    /// Appends `samples` to a wave track through the pending-update path,
    /// as a recording thread would, then commits it as one undo step.
    Record { track: usize, samples: usize },
    Remove { track: usize },
    Rename { track: usize, name: String },
    Group { track: usize, size: usize },
    MoveUp { track: usize },
    MoveDown { track: usize },
    Select {
        track: usize,
        #[serde(default = "default_true")]
        selected: bool,
    },
    SetRegion { t0: f64, t1: f64 },
    SetTag { key: String, value: String },
    Copy,
    Push {
        description: String,
        #[serde(default)]
        short: Option<String>,
        #[serde(default)]
        consolidate: bool,
    },
    Modify,
    Undo,
    Redo,
    Jump { state: usize },
    PruneOldest { count: usize },
    Save { path: PathBuf },
}

fn default_true() -> bool {
    true
}

/// Parses a script from JSON.
pub fn parse(json: &str) -> Result<Vec<ScriptCommand>, ScriptError> {
    Ok(serde_json::from_str(json)?)
}

/// Runs scripts against a project whose blocks live in a
/// [`MemoryBlockStore`].
pub struct ScriptRunner {
    store: Arc<MemoryBlockStore>,
}

impl ScriptRunner {
    pub fn new(store: Arc<MemoryBlockStore>) -> Self {
        Self { store }
    }

    /// Executes `commands` in order, stopping at the first failure.
    pub fn run(&self, project: &mut Project, commands: &[ScriptCommand]) -> Result<(), ScriptError> {
        for (step, command) in commands.iter().enumerate() {
            tracing::debug!(step, ?command, "Running script command");
            self.execute(project, command)?;
        }
        Ok(())
    }

    /// Executes a single command.
    pub fn execute(&self, project: &mut Project, command: &ScriptCommand) -> Result<(), ScriptError> {
        match command {
            ScriptCommand::AddWave {
                name,
                rate,
                samples,
                stereo,
            } => {
                let channels = if *stereo { 2 } else { 1 };
                let tracks = (0..channels)
                    .map(|_| {
                        let mut wave = WaveData::new(*rate);
                        if *samples > 0 {
                            wave.append_block(self.store.create_block(vec![0.0_f32; *samples]));
                        }
                        project.new_track(name.as_str(), TrackKind::Wave(wave))
                    })
                    .collect();
                project.tracks().add_channels(tracks);
            }
            ScriptCommand::AddNote { name, notes } => {
                let mut data = NoteData::new();
                for note in notes {
                    data.add_note(note.clone());
                }
                let track = project.new_track(name.as_str(), TrackKind::Note(data));
                project.tracks().add(track);
            }
            ScriptCommand::AddLabel { name, labels } => {
                let mut data = LabelData::new();
                for label in labels {
                    data.add_label(label.start, label.end, label.text.as_str());
                }
                let track = project.new_track(name.as_str(), TrackKind::Label(data));
                project.tracks().add(track);
            }
            ScriptCommand::Record { track, samples } => {
                let id = track_at(project, *track)?;
                let shadow = project
                    .tracks()
                    .register_pending_change(id, recording_updater())?;
                let block = self.store.create_block(vec![0.0_f32; *samples]);
                if let Some(wave) = shadow.lock().as_wave_mut() {
                    wave.append_block(block);
                }
                project.reconcile_pending();
                project.commit_pending("Recorded Audio", "Record");
            }
            ScriptCommand::Remove { track } => {
                let id = track_at(project, *track)?;
                project.tracks().remove(id)?;
            }
            ScriptCommand::Rename { track, name } => {
                let id = track_at(project, *track)?;
                project.tracks().set_name(id, name.as_str())?;
            }
            ScriptCommand::Group { track, size } => {
                let id = track_at(project, *track)?;
                project.tracks().group_channels(id, *size)?;
            }
            ScriptCommand::MoveUp { track } => {
                let id = track_at(project, *track)?;
                project.tracks().move_up(id)?;
            }
            ScriptCommand::MoveDown { track } => {
                let id = track_at(project, *track)?;
                project.tracks().move_down(id)?;
            }
            ScriptCommand::Select { track, selected } => {
                let id = track_at(project, *track)?;
                project.tracks().set_selected(id, *selected)?;
            }
            ScriptCommand::SetRegion { t0, t1 } => {
                project.set_selection(SelectedRegion::new(*t0, *t1));
            }
            ScriptCommand::SetTag { key, value } => {
                project.set_tag(key.as_str(), value.as_str());
            }
            ScriptCommand::Copy => {
                project.copy_to_clipboard();
            }
            ScriptCommand::Push {
                description,
                short,
                consolidate,
            } => {
                let short = short.as_deref().unwrap_or(description);
                project.push_state(description, short, *consolidate);
            }
            ScriptCommand::Modify => project.modify_state(),
            ScriptCommand::Undo => {
                if !project.undo() {
                    return Err(ScriptError::Unavailable("undo"));
                }
            }
            ScriptCommand::Redo => {
                if !project.redo() {
                    return Err(ScriptError::Unavailable("redo"));
                }
            }
            ScriptCommand::Jump { state } => {
                if !project.set_state_to(*state) {
                    return Err(ScriptError::Unavailable("jump"));
                }
            }
            ScriptCommand::PruneOldest { count } => {
                let history = project.history_mut();
                let current = history.current_index().unwrap_or(0);
                history.remove_old_states((*count).min(current));
            }
            ScriptCommand::Save { path } => {
                project.save(path)?;
            }
        }
        Ok(())
    }
}

fn track_at(project: &Project, position: usize) -> Result<TrackId, ScriptError> {
    project
        .tracks()
        .track_ids()
        .get(position)
        .copied()
        .ok_or(ScriptError::NoTrackAt(position))
}

/// One history state in a [`HistoryReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateReport {
    pub index: usize,
    pub description: String,
    pub short_description: String,
    pub tracks: usize,
    pub bytes: u64,
}

/// One live track in a [`HistoryReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReport {
    pub id: TrackId,
    pub name: String,
    pub kind: &'static str,
    pub linked: bool,
    pub selected: bool,
    pub y: u32,
}

/// Summary of a project's history and live tracks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryReport {
    pub project: String,
    pub current: Option<usize>,
    pub unsaved_changes: bool,
    pub states: Vec<StateReport>,
    pub clipboard_bytes: u64,
    pub tracks: Vec<TrackReport>,
}

impl HistoryReport {
    /// Recalculates space usage and summarizes `project`.
    pub fn collect(project: &mut Project) -> Self {
        project.history_mut().calculate_space_usage();
        let history = project.history();

        let mut states = Vec::with_capacity(history.len());
        history.visit_states(false, |index, state| {
            let (description, bytes) = history.long_description(index).unwrap_or_default();
            states.push(StateReport {
                index,
                description: description.to_string(),
                short_description: history
                    .short_description(index)
                    .unwrap_or_default()
                    .to_string(),
                tracks: state.tracks().len(),
                bytes,
            });
        });

        let tracks = project
            .tracks()
            .tracks()
            .iter()
            .map(|t| TrackReport {
                id: t.id(),
                name: t.name().to_string(),
                kind: t.kind().name(),
                linked: t.is_linked(),
                selected: t.is_selected(),
                y: t.y(),
            })
            .collect();

        Self {
            project: project.name().to_string(),
            current: history.current_index(),
            unsaved_changes: history.unsaved_changes(),
            states,
            clipboard_bytes: history.clipboard_space_usage(),
            tracks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn session() -> (Project, ScriptRunner) {
        let store = Arc::new(MemoryBlockStore::new());
        let project = Project::new("Script", store.clone(), &Config::default());
        (project, ScriptRunner::new(store))
    }

    #[test]
    fn test_parse_commands() {
        let commands = parse(
            r#"[
                {"op": "add_wave", "name": "Vocals", "stereo": true},
                {"op": "push", "description": "Import"},
                {"op": "select", "track": 1},
                {"op": "undo"}
            ]"#,
        )
        .unwrap();
        assert_eq!(commands.len(), 4);
        assert_eq!(
            commands[0],
            ScriptCommand::AddWave {
                name: "Vocals".into(),
                rate: DEFAULT_RATE,
                samples: 0,
                stereo: true,
            }
        );
        assert_eq!(
            commands[2],
            ScriptCommand::Select {
                track: 1,
                selected: true
            }
        );
        assert!(parse(r#"[{"op": "explode"}]"#).is_err());
    }

    #[test]
    fn test_create_delete_undo_session() {
        let (mut project, runner) = session();
        let commands = parse(
            r#"[
                {"op": "add_label", "name": "trackA"},
                {"op": "push", "description": "Create Track"},
                {"op": "remove", "track": 0},
                {"op": "push", "description": "Delete Track"},
                {"op": "undo"}
            ]"#,
        )
        .unwrap();
        runner.run(&mut project, &commands).unwrap();

        let report = HistoryReport::collect(&mut project);
        assert_eq!(report.current, Some(0));
        assert_eq!(report.states.len(), 2);
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks[0].id.as_u64(), 1);
        assert_eq!(report.tracks[0].name, "trackA");
    }

    #[test]
    fn test_recording_session_reports_space() {
        let (mut project, runner) = session();
        let commands = vec![
            ScriptCommand::AddWave {
                name: "Mic".into(),
                rate: DEFAULT_RATE,
                samples: 100,
                stereo: false,
            },
            ScriptCommand::Push {
                description: "New Track".into(),
                short: None,
                consolidate: false,
            },
            ScriptCommand::Record {
                track: 0,
                samples: 50,
            },
        ];
        runner.run(&mut project, &commands).unwrap();

        let report = HistoryReport::collect(&mut project);
        assert_eq!(report.states.len(), 2);
        assert_eq!(report.states[1].short_description, "Record");
        // The first block belongs to both states and counts toward the newer
        assert_eq!(report.states[0].bytes, 0);
        assert_eq!(report.states[1].bytes, 600);
    }

    #[test]
    fn test_consolidated_moves() {
        let (mut project, runner) = session();
        let commands = parse(
            r#"[
                {"op": "add_label", "name": "A"},
                {"op": "add_label", "name": "B"},
                {"op": "add_label", "name": "C"},
                {"op": "push", "description": "Create"},
                {"op": "move_up", "track": 2},
                {"op": "push", "description": "Move Track", "consolidate": true},
                {"op": "move_up", "track": 1},
                {"op": "push", "description": "Move Track", "consolidate": true}
            ]"#,
        )
        .unwrap();
        runner.run(&mut project, &commands).unwrap();

        let report = HistoryReport::collect(&mut project);
        assert_eq!(report.states.len(), 2);
        let names: Vec<_> = report.tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_errors_stop_the_run() {
        let (mut project, runner) = session();
        let commands = vec![ScriptCommand::Undo, ScriptCommand::Modify];
        assert!(matches!(
            runner.run(&mut project, &commands),
            Err(ScriptError::Unavailable("undo"))
        ));
        assert!(matches!(
            runner.execute(&mut project, &ScriptCommand::Remove { track: 3 }),
            Err(ScriptError::NoTrackAt(3))
        ));
    }

    #[test]
    fn test_prune_never_removes_current_state() {
        let (mut project, runner) = session();
        let commands = parse(
            r#"[
                {"op": "push", "description": "One"},
                {"op": "push", "description": "Two"},
                {"op": "undo"},
                {"op": "prune_oldest", "count": 5}
            ]"#,
        )
        .unwrap();
        runner.run(&mut project, &commands).unwrap();
        assert_eq!(project.history().len(), 2);
        assert_eq!(project.history().current_index(), Some(0));
    }
}
