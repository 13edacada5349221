//! Sequences, tracks, clips, and transitions.
//!
//! Track index 0 is the topmost layer. A clip is active on the half-open
//! interval `[start, start + duration)`.

use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::speed::{effective_duration, source_position_for_playback_time, SpeedCurve};
use crate::{AssetId, ClipId, SequenceId, TrackId};

/// Two clips overlap when their intersection is longer than this (seconds).
pub const OVERLAP_EPSILON: f64 = 1e-6;

/// A composition of layered tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub id: SequenceId,
    pub name: String,

    /// Canvas size in pixels.
    pub width: u32,
    pub height: u32,

    /// Authoritative frame rate for rendering and export.
    pub fps: f64,

    /// Audio mix sample rate.
    pub sample_rate: u32,

    /// Derived: `max(clip.start + clip.duration)` over all clips.
    #[serde(default)]
    pub duration: f64,

    /// Tracks from top (index 0) to bottom.
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Track content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    /// Titles and graphics layered over video.
    Overlay,
    /// Adjustment track.
    Fx,
}

impl TrackKind {
    /// Whether clips on this track are composited into the picture.
    pub fn is_visual(&self) -> bool {
        matches!(self, TrackKind::Video | TrackKind::Overlay | TrackKind::Fx)
    }

    /// Whether a clip of `kind` may be placed on this track.
    pub fn accepts(&self, kind: ClipKind) -> bool {
        match self {
            TrackKind::Audio => kind == ClipKind::Audio,
            TrackKind::Video | TrackKind::Overlay | TrackKind::Fx => kind != ClipKind::Audio,
        }
    }
}

/// A horizontal lane of clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,

    #[serde(default)]
    pub name: String,

    pub kind: TrackKind,

    /// Clips sorted by `start`.
    #[serde(default)]
    pub clips: Vec<Clip>,

    #[serde(default)]
    pub allow_overlap: bool,

    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub muted: bool,

    /// Track gain [0.0, 2.0].
    #[serde(default = "default_unit")]
    pub volume: f32,
}

/// Media kind a clip plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Video,
    Audio,
    Image,
}

/// A placed reference to a media asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,

    /// Asset in [`crate::Project::media_assets`].
    pub media_id: AssetId,

    pub kind: ClipKind,

    /// Timeline position (seconds).
    pub start: f64,

    /// Timeline length; equals the speed-adjusted trim window.
    pub duration: f64,

    /// Source window start (seconds into the asset).
    pub trim_start: f64,

    /// Source window end (seconds into the asset).
    pub trim_end: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_curve: Option<SpeedCurve>,

    /// Applied in list order.
    #[serde(default)]
    pub effects: Vec<Effect>,

    #[serde(default)]
    pub transitions: Vec<Transition>,

    /// Compositing opacity [0.0, 1.0].
    #[serde(default = "default_unit")]
    pub opacity: f32,

    /// Clip gain [0.0, 2.0].
    #[serde(default = "default_unit")]
    pub volume: f32,
}

/// An opacity ramp at a clip edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub id: String,
    pub kind: TransitionKind,
    pub edge: TransitionEdge,
    /// Ramp length in timeline seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Fade,
    Dissolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionEdge {
    In,
    Out,
}

/// A clip active at some timeline instant.
#[derive(Debug, Clone, Copy)]
pub struct ActiveClip<'a> {
    pub track_index: usize,
    pub track: &'a Track,
    pub clip: &'a Clip,
    /// Seconds since the clip's start.
    pub local_time: f64,
    /// Seconds into the source asset.
    pub source_time: f64,
}

/// The picture clip at an instant, keyed by id for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameLookup {
    pub clip_id: ClipId,
    pub track_id: TrackId,
    pub local_time: f64,
    pub global_time: f64,
    pub source_time: f64,
}

fn default_unit() -> f32 {
    1.0
}

impl Sequence {
    pub fn new(name: impl Into<String>, width: u32, height: u32, fps: f64) -> Self {
        Self {
            id: crate::new_id(),
            name: name.into(),
            width,
            height,
            fps,
            sample_rate: 48_000,
            duration: 0.0,
            tracks: vec![],
        }
    }

    /// `max(clip.start + clip.duration)` over all clips (0 when empty).
    pub fn computed_duration(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .map(Clip::end)
            .fold(0.0, f64::max)
    }

    pub fn recompute_duration(&mut self) {
        self.duration = self.computed_duration();
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn track_mut(&mut self, track_id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == track_id)
    }

    pub fn track_index(&self, track_id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == track_id)
    }

    /// `(track index, clip index)` of a clip.
    pub fn locate_clip(&self, clip_id: &str) -> Option<(usize, usize)> {
        self.tracks.iter().enumerate().find_map(|(ti, t)| {
            t.clips
                .iter()
                .position(|c| c.id == clip_id)
                .map(|ci| (ti, ci))
        })
    }

    pub fn clip(&self, clip_id: &str) -> Option<&Clip> {
        self.locate_clip(clip_id)
            .map(|(ti, ci)| &self.tracks[ti].clips[ci])
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.tracks.iter().flat_map(|t| t.clips.iter())
    }

    /// Clips active at `time`, top layer first.
    pub fn active_clips(&self, time: f64) -> Vec<ActiveClip<'_>> {
        let mut active = Vec::new();
        for (track_index, track) in self.tracks.iter().enumerate() {
            if let Some(clip) = track.active_clip_at(time) {
                let local_time = time - clip.start;
                active.push(ActiveClip {
                    track_index,
                    track,
                    clip,
                    local_time,
                    source_time: clip.source_time_at(local_time),
                });
            }
        }
        active
    }

    /// The topmost picture clip at `time`.
    pub fn frame_at(&self, time: f64) -> Option<FrameLookup> {
        self.active_clips(time)
            .into_iter()
            .find(|a| a.track.kind.is_visual() && a.clip.kind != ClipKind::Audio)
            .map(|a| FrameLookup {
                clip_id: a.clip.id.clone(),
                track_id: a.track.id.clone(),
                local_time: a.local_time,
                global_time: time,
                source_time: a.source_time,
            })
    }

    /// First overlap on any track that forbids overlaps.
    pub fn find_overlap(&self) -> Option<(TrackId, ClipId, ClipId)> {
        self.tracks.iter().find_map(|t| {
            t.find_overlap()
                .map(|(a, b)| (t.id.clone(), a, b))
        })
    }
}

impl Track {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            id: crate::new_id(),
            name: String::new(),
            kind,
            clips: vec![],
            allow_overlap: false,
            locked: false,
            muted: false,
            volume: 1.0,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn clip(&self, clip_id: &str) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == clip_id)
    }

    pub fn sort_clips(&mut self) {
        self.clips.sort_by(|a, b| a.start.total_cmp(&b.start));
    }

    /// Active clip at `time`. On overlap-tolerant tracks the latest-starting
    /// clip wins.
    pub fn active_clip_at(&self, time: f64) -> Option<&Clip> {
        self.clips.iter().rev().find(|c| c.contains(time))
    }

    /// First pair of overlapping clips, if this track forbids overlaps.
    pub fn find_overlap(&self) -> Option<(ClipId, ClipId)> {
        if self.allow_overlap {
            return None;
        }
        let mut sorted: Vec<&Clip> = self.clips.iter().collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
        // Sorted by start, so tracking the furthest end is enough.
        let mut furthest: Option<&Clip> = None;
        for clip in sorted {
            if let Some(prev) = furthest {
                if prev.overlaps(clip) {
                    return Some((prev.id.clone(), clip.id.clone()));
                }
                if clip.end() > prev.end() {
                    furthest = Some(clip);
                }
            } else {
                furthest = Some(clip);
            }
        }
        None
    }

    pub fn end(&self) -> f64 {
        self.clips.iter().map(Clip::end).fold(0.0, f64::max)
    }
}

impl Clip {
    /// Create a clip with its duration derived from the trim window.
    pub fn new(
        media_id: impl Into<AssetId>,
        kind: ClipKind,
        start: f64,
        trim_start: f64,
        trim_end: f64,
    ) -> Self {
        let mut clip = Self {
            id: crate::new_id(),
            media_id: media_id.into(),
            kind,
            start,
            duration: 0.0,
            trim_start,
            trim_end,
            speed_curve: None,
            effects: vec![],
            transitions: vec![],
            opacity: 1.0,
            volume: 1.0,
        };
        clip.recompute_duration();
        clip
    }

    pub fn with_id(mut self, id: impl Into<ClipId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_speed_curve(mut self, curve: SpeedCurve) -> Self {
        self.speed_curve = Some(curve);
        self.recompute_duration();
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Length of the source window.
    pub fn source_span(&self) -> f64 {
        (self.trim_end - self.trim_start).max(0.0)
    }

    /// Timeline length implied by the trim window and speed curve.
    pub fn computed_duration(&self) -> f64 {
        effective_duration(self.speed_curve.as_ref(), self.source_span())
    }

    pub fn recompute_duration(&mut self) {
        self.duration = self.computed_duration();
    }

    /// Half-open containment `[start, end)`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end()
    }

    pub fn overlaps(&self, other: &Clip) -> bool {
        let lo = self.start.max(other.start);
        let hi = self.end().min(other.end());
        hi - lo > OVERLAP_EPSILON
    }

    /// Source time shown `local_time` seconds after the clip's start.
    pub fn source_time_at(&self, local_time: f64) -> f64 {
        self.trim_start
            + source_position_for_playback_time(
                local_time.max(0.0),
                self.speed_curve.as_ref(),
                self.source_span(),
            )
    }

    /// Opacity multiplier from the clip's transitions at `local_time`.
    pub fn transition_opacity(&self, local_time: f64) -> f32 {
        let mut factor = 1.0f64;
        for t in &self.transitions {
            if t.duration <= 0.0 {
                continue;
            }
            let ramp = match t.edge {
                TransitionEdge::In => local_time / t.duration,
                TransitionEdge::Out => (self.duration - local_time) / t.duration,
            };
            factor *= ramp.clamp(0.0, 1.0);
        }
        factor as f32
    }
}

impl Transition {
    pub fn new(kind: TransitionKind, edge: TransitionEdge, duration: f64) -> Self {
        Self {
            id: crate::new_id(),
            kind,
            edge,
            duration,
        }
    }
}
