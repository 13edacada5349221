//! Cutline Project Model
//!
//! Defines the core data contracts for Cutline projects:
//! - **Project:** Root aggregate owning sequences, the media asset arena, and editor settings
//! - **Timeline:** Sequences, tracks, clips, transitions, and their placement invariants
//! - **Speed curves:** Keyframed variable-speed playback math
//! - **Edits:** Pure `(Project) -> Project` transformations with ripple support
//! - **History / Editor:** Snapshot-based undo/redo and the intent-driven state container
//! - **Store:** Persistence collaborator for projects and history snapshots
//!
//! All times are seconds on the sequence timeline unless a name says
//! otherwise (`trim_*` and `source_*` are seconds in the source media).

pub mod beat;
pub mod edit;
pub mod editor;
pub mod effect;
pub mod frame;
pub mod history;
pub mod project;
pub mod projection;
pub mod speed;
pub mod store;
pub mod timeline;

pub use beat::*;
pub use edit::EditError;
pub use editor::*;
pub use effect::*;
pub use frame::*;
pub use history::*;
pub use project::*;
pub use projection::*;
pub use speed::*;
pub use store::*;
pub use timeline::*;

/// Identifier of a media asset in [`Project::media_assets`].
pub type AssetId = String;

/// Identifier of a clip (unique within a project).
pub type ClipId = String;

/// Identifier of a track (unique within a project).
pub type TrackId = String;

/// Identifier of a sequence.
pub type SequenceId = String;

/// Generate a fresh random identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
