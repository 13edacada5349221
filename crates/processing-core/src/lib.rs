//! Cutline Processing Core
//!
//! Frame and edit-time computation on top of the project model:
//! - **Effects:** Ordered, blend-weighted pixel transforms per clip
//! - **Snap:** Magnetic snapping to clip edges, beat markers, and a grid
//! - **Beats:** Beat-analysis collaborator contract and marker normalization
//! - **Slip/Slide:** Transactional trim-window and placement drags
//!
//! Apart from the beat-analysis collaborator this crate is pure
//! computation: frames and projects in, frames and projects out.

pub mod beats;
pub mod effects;
pub mod slip_slide;
pub mod snap;

pub use beats::{normalize_beat_markers, BeatAnalysis, BeatAnalyzer};
pub use effects::{CustomEffect, EffectApplyError, EffectsOutcome, EffectsPipeline, Lut3d};
pub use slip_slide::{GestureMode, GestureModifiers, SlipSlideGesture};
pub use snap::{SnapKind, SnapManager, SnapOptions, SnapResult};
