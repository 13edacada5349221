//! Editor state container.
//!
//! [`Editor`] owns the current project snapshot, the undo/redo log, and the
//! clip selection. The UI talks to it only through [`EditIntent`]s; every
//! successful edit swaps in a new immutable snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::edit::{self, ClipUpdate, EditError, TrackUpdate};
use crate::history::HistoryLog;
use crate::project::{Project, ProjectError};
use crate::projection::SequenceView;
use crate::store::{HistoryDirection, ProjectStore};
use crate::timeline::Clip;
use crate::{ClipId, SequenceId, TrackId};

/// Edit requests emitted by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditIntent {
    InsertClip {
        track_id: TrackId,
        clip: Clip,
    },
    MoveClip {
        clip_id: ClipId,
        start: f64,
        #[serde(default)]
        track_id: Option<TrackId>,
    },
    TrimClip {
        clip_id: ClipId,
        trim_start: f64,
        trim_end: f64,
    },
    SplitClip {
        clip_id: ClipId,
        at: f64,
    },
    DeleteClips {
        clip_ids: Vec<ClipId>,
    },
    DeleteSelection,
    Select {
        clip_ids: Vec<ClipId>,
        #[serde(default)]
        additive: bool,
    },
    ClearSelection,
    ReorderTracks {
        sequence_id: SequenceId,
        track_ids: Vec<TrackId>,
    },
    UpdateClip {
        clip_id: ClipId,
        update: ClipUpdate,
    },
    UpdateTrack {
        track_id: TrackId,
        update: TrackUpdate,
    },
}

impl EditIntent {
    /// Short description used as the history label.
    pub fn label(&self) -> &'static str {
        match self {
            EditIntent::InsertClip { .. } => "insert clip",
            EditIntent::MoveClip { .. } => "move clip",
            EditIntent::TrimClip { .. } => "trim clip",
            EditIntent::SplitClip { .. } => "split clip",
            EditIntent::DeleteClips { .. } | EditIntent::DeleteSelection => "delete clips",
            EditIntent::Select { .. } | EditIntent::ClearSelection => "select",
            EditIntent::ReorderTracks { .. } => "reorder tracks",
            EditIntent::UpdateClip { .. } => "update clip",
            EditIntent::UpdateTrack { .. } => "update track",
        }
    }
}

/// Result of applying an intent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    /// Whether a new project snapshot was committed.
    pub changed: bool,
    /// Clip created by the edit (split right half, inserted clip).
    pub created: Option<ClipId>,
}

/// Owner of the live project and its history.
pub struct Editor {
    project: Arc<Project>,
    history: HistoryLog,
    selection: BTreeSet<ClipId>,
    store: Option<Arc<dyn ProjectStore>>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("project_id", &self.project.id)
            .field("history_past", &self.history.past_len())
            .field("history_future", &self.history.future_len())
            .field("selection", &self.selection)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Editor {
    pub fn new(project: Project) -> Self {
        Self::with_history_capacity(project, crate::history::DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(project: Project, capacity: usize) -> Self {
        Self {
            project: Arc::new(project),
            history: HistoryLog::new(capacity),
            selection: BTreeSet::new(),
            store: None,
        }
    }

    /// Persist history snapshots through `store` as edits happen.
    pub fn with_store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Load a project from `store`, replacing any in-memory state.
    pub fn open(
        store: Arc<dyn ProjectStore>,
        id: &str,
        capacity: usize,
    ) -> Result<Self, ProjectError> {
        let project = store.load(id)?;
        tracing::info!(project_id = %id, name = %project.name, "Opened project");
        Ok(Self::with_history_capacity(project, capacity).with_store(store))
    }

    /// Current snapshot.
    pub fn project(&self) -> Arc<Project> {
        Arc::clone(&self.project)
    }

    pub fn selection(&self) -> &BTreeSet<ClipId> {
        &self.selection
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Read-only projection of the active sequence for the UI.
    pub fn view(&self) -> Option<SequenceView> {
        let seq = self.project.active_sequence()?;
        SequenceView::build(&self.project, &seq.id, &self.selection)
    }

    /// Interpret a UI intent.
    pub fn apply(&mut self, intent: EditIntent) -> Result<EditOutcome, EditError> {
        let label = intent.label();
        let current = Arc::clone(&self.project);
        let mut created = None;

        let next = match intent {
            EditIntent::InsertClip { track_id, clip } => {
                created = Some(clip.id.clone());
                edit::insert_clip(&current, &track_id, clip)?
            }
            EditIntent::MoveClip {
                clip_id,
                start,
                track_id,
            } => edit::move_clip(&current, &clip_id, start, track_id.as_deref())?,
            EditIntent::TrimClip {
                clip_id,
                trim_start,
                trim_end,
            } => edit::trim_clip(&current, &clip_id, trim_start, trim_end)?,
            EditIntent::SplitClip { clip_id, at } => {
                let (next, right) = edit::split_clip(&current, &clip_id, at)?;
                created = Some(right);
                next
            }
            EditIntent::DeleteClips { clip_ids } => edit::delete_clips(&current, &clip_ids)?,
            EditIntent::DeleteSelection => {
                if self.selection.is_empty() {
                    return Ok(EditOutcome::default());
                }
                let ids: Vec<ClipId> = self.selection.iter().cloned().collect();
                edit::delete_clips(&current, &ids)?
            }
            EditIntent::Select { clip_ids, additive } => {
                for id in &clip_ids {
                    if !current.sequences.iter().any(|s| s.clip(id).is_some()) {
                        return Err(EditError::ClipNotFound {
                            clip_id: id.clone(),
                        });
                    }
                }
                if !additive {
                    self.selection.clear();
                }
                self.selection.extend(clip_ids);
                return Ok(EditOutcome::default());
            }
            EditIntent::ClearSelection => {
                self.selection.clear();
                return Ok(EditOutcome::default());
            }
            EditIntent::ReorderTracks {
                sequence_id,
                track_ids,
            } => edit::reorder_tracks(&current, &sequence_id, &track_ids)?,
            EditIntent::UpdateClip { clip_id, update } => {
                edit::update_clip(&current, &clip_id, &update)?
            }
            EditIntent::UpdateTrack { track_id, update } => {
                edit::update_track(&current, &track_id, &update)?
            }
        };

        let changed = self.commit(label, next);
        Ok(EditOutcome { changed, created })
    }

    /// Commit an externally computed snapshot (e.g. a finished slip gesture).
    ///
    /// Returns false when `next` equals the current project.
    pub fn commit(&mut self, label: &str, mut next: Project) -> bool {
        if next == *self.project {
            return false;
        }
        next.touch();
        let previous = std::mem::replace(&mut self.project, Arc::new(next));
        let (entry, pruned) = self.history.record(label, Arc::clone(&previous));
        let seq = entry.seq;
        if let Some(pruned) = pruned {
            tracing::trace!(seq = pruned.seq, "History entry pruned");
        }
        self.persist_snapshot(HistoryDirection::Past, seq, &previous);
        self.prune_selection();
        tracing::debug!(label, seq, "Committed edit");
        true
    }

    pub fn undo(&mut self) -> bool {
        let current = Arc::clone(&self.project);
        match self.history.undo(Arc::clone(&current)) {
            Some(previous) => {
                self.project = previous;
                if let Some(seq) = self.history.last_future().map(|e| e.seq) {
                    self.persist_snapshot(HistoryDirection::Future, seq, &current);
                }
                self.prune_selection();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = Arc::clone(&self.project);
        match self.history.redo(Arc::clone(&current)) {
            Some(next) => {
                self.project = next;
                if let Some(seq) = self.history.last_past().map(|e| e.seq) {
                    self.persist_snapshot(HistoryDirection::Past, seq, &current);
                }
                self.prune_selection();
                true
            }
            None => false,
        }
    }

    /// Replace the project wholesale (load/hydrate). Clears history and selection.
    pub fn replace(&mut self, project: Project) {
        self.project = Arc::new(project);
        self.history.clear();
        self.selection.clear();
    }

    /// Explicit save. Failures are terminal for the caller.
    pub fn save(&self) -> Result<String, ProjectError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| ProjectError::ValidationError {
                message: "editor has no project store".to_string(),
            })?;
        let id = store.save(Some(&self.project.id), &self.project)?;
        tracing::info!(project_id = %id, "Saved project");
        Ok(id)
    }

    fn persist_snapshot(&self, direction: HistoryDirection, seq: u64, project: &Project) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put_snapshot(&project.id, direction, seq, project) {
                tracing::warn!(
                    error = %e,
                    direction = direction.as_str(),
                    seq,
                    "Failed to persist history snapshot"
                );
            }
        }
    }

    fn prune_selection(&mut self) {
        let project = Arc::clone(&self.project);
        self.selection
            .retain(|id| project.sequences.iter().any(|s| s.clip(id).is_some()));
    }
}
