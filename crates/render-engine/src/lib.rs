//! Cutline Render Engine
//!
//! Turns a project's sequence into pictures and sound, live or offline.
//!
//! # Pipeline Architecture
//!
//! ```text
//! Sequence ── active clips at t ──┐
//!                                 ├── Speed curve (source time)
//! MediaAssetCache ────────────────┘         │
//!                                           ├── Effects pipeline (per clip)
//!                                           │
//!                                           ├── Fit + opacity, bottom track first
//!                                           ▼
//!                                    FrameCompositor
//!                                     │           │
//!                    budgeted fetch   │           │  waiting fetch
//!                                     ▼           ▼
//!                          PlaybackRenderer    export_project
//!                                 │                 │
//!                          RenderSurface      MediaEncoder ── MediaBlob
//! ```

pub mod compositor;
pub mod encoder;
pub mod export;
pub mod ffmpeg;
pub mod playback;

pub use compositor::{ComposedFrame, FetchPolicy, FrameCompositor, RenderScope};
pub use encoder::*;
pub use export::*;
pub use ffmpeg::FfmpegEncoder;
pub use playback::*;
