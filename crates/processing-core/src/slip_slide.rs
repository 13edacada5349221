//! Slip and slide drag gestures.
//!
//! A gesture captures the project when the drag starts. Every `update`
//! recomputes the edit from that capture with the total drag offset, so
//! repeated pointer events never accumulate rounding. `cancel` hands the
//! capture back untouched.
//!
//! - **Slip** moves the source window under a fixed timeline placement.
//! - **Slide** moves the clip on the timeline with its window untouched.

use std::sync::Arc;

use cutline_project_model::edit::{move_clip, slip_clip};
use cutline_project_model::{Clip, ClipId, EditError, Project, OVERLAP_EPSILON};

use crate::snap::SnapManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureMode {
    Slip,
    Slide,
}

/// Modifier keys held when the drag started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GestureModifiers {
    pub alt: bool,
    pub shift: bool,
}

impl GestureModifiers {
    /// `alt` alone slips, `alt + shift` slides, anything else is a plain drag.
    pub fn mode(&self) -> Option<GestureMode> {
        match (self.alt, self.shift) {
            (true, false) => Some(GestureMode::Slip),
            (true, true) => Some(GestureMode::Slide),
            _ => None,
        }
    }
}

/// An in-progress slip or slide.
#[derive(Debug, Clone)]
pub struct SlipSlideGesture {
    mode: GestureMode,
    clip_id: ClipId,
    original: Arc<Project>,
    current: Project,
    min_offset: f64,
    max_offset: f64,
    applied: f64,
}

impl SlipSlideGesture {
    /// Start a gesture on `clip_id`.
    ///
    /// Fails if the modifiers do not select a mode, the clip is missing, or
    /// its track is locked.
    pub fn begin(
        project: Arc<Project>,
        clip_id: &str,
        modifiers: GestureModifiers,
    ) -> Result<Self, EditError> {
        let mode = modifiers.mode().ok_or_else(|| EditError::InvalidValue {
            message: "modifiers select neither slip nor slide".to_string(),
        })?;
        let (min_offset, max_offset) = offset_bounds(&project, clip_id, mode)?;
        tracing::debug!(clip_id, ?mode, min_offset, max_offset, "Gesture started");

        Ok(Self {
            mode,
            clip_id: clip_id.to_string(),
            current: (*project).clone(),
            original: project,
            min_offset,
            max_offset,
            applied: 0.0,
        })
    }

    pub fn mode(&self) -> GestureMode {
        self.mode
    }

    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    /// Offset actually in effect after clamping.
    pub fn applied_offset(&self) -> f64 {
        self.applied
    }

    /// Project with the current offset applied.
    pub fn preview(&self) -> &Project {
        &self.current
    }

    /// Set the total drag offset in seconds (signed, relative to the start
    /// of the gesture). The offset is clamped to the legal range.
    pub fn update(&mut self, offset: f64) -> Result<&Project, EditError> {
        if !offset.is_finite() {
            return Err(EditError::InvalidValue {
                message: format!("gesture offset {offset} is not finite"),
            });
        }
        let offset = offset.clamp(self.min_offset, self.max_offset);
        let clip = self.original_clip()?;

        let next = if offset == 0.0 {
            (*self.original).clone()
        } else {
            match self.mode {
                GestureMode::Slip => slip_clip(&self.original, &self.clip_id, offset)?,
                GestureMode::Slide => {
                    move_clip(&self.original, &self.clip_id, clip.start + offset, None)?
                }
            }
        };
        self.current = next;
        self.applied = offset;
        Ok(&self.current)
    }

    /// Slide with magnetic snapping of either clip edge, within the
    /// snapper's threshold.
    ///
    /// Slip gestures do not move clip edges, so they ignore the snapper.
    pub fn update_snapped(
        &mut self,
        offset: f64,
        snapper: &SnapManager,
    ) -> Result<&Project, EditError> {
        if self.mode == GestureMode::Slip {
            return self.update(offset);
        }
        let clip = self.original_clip()?;
        let start = clip.start + offset;
        let end = clip.end() + offset;
        let by_start = snapper.snap_default(start).map(|s| (s, s.time - start));
        let by_end = snapper.snap_default(end).map(|s| (s, s.time - end));
        let correction = match (by_start, by_end) {
            (Some((a, da)), Some((b, db))) => {
                if (b.kind, b.distance) < (a.kind, a.distance) {
                    db
                } else {
                    da
                }
            }
            (Some((_, d)), None) | (None, Some((_, d))) => d,
            (None, None) => 0.0,
        };
        self.update(offset + correction)
    }

    /// Finish the gesture and return the edited project.
    pub fn commit(self) -> Project {
        tracing::debug!(clip_id = %self.clip_id, offset = self.applied, "Gesture committed");
        self.current
    }

    /// Abandon the gesture and return the project as it was at `begin`.
    pub fn cancel(self) -> Arc<Project> {
        self.original
    }

    fn original_clip(&self) -> Result<Clip, EditError> {
        find_clip(&self.original, &self.clip_id).map(|(clip, _)| clip.clone())
    }
}

fn find_clip<'a>(
    project: &'a Project,
    clip_id: &str,
) -> Result<(&'a Clip, &'a cutline_project_model::Track), EditError> {
    project
        .sequences
        .iter()
        .flat_map(|s| s.tracks.iter())
        .find_map(|t| t.clip(clip_id).map(|c| (c, t)))
        .ok_or_else(|| EditError::ClipNotFound {
            clip_id: clip_id.to_string(),
        })
}

fn offset_bounds(project: &Project, clip_id: &str, mode: GestureMode) -> Result<(f64, f64), EditError> {
    let (clip, track) = find_clip(project, clip_id)?;
    if track.locked {
        return Err(EditError::TrackLocked {
            track_id: track.id.clone(),
        });
    }

    match mode {
        GestureMode::Slip => {
            let source = project
                .source_duration(&clip.media_id)
                .ok_or_else(|| EditError::AssetNotFound {
                    asset_id: clip.media_id.clone(),
                })?;
            Ok((-clip.trim_start, (source - clip.trim_end).max(0.0)))
        }
        GestureMode::Slide => {
            let mut min = -clip.start;
            let mut max = f64::INFINITY;
            if !track.allow_overlap {
                for other in track.clips.iter().filter(|o| o.id != clip.id) {
                    if other.end() <= clip.start + OVERLAP_EPSILON {
                        min = min.max(other.end() - clip.start);
                    } else if other.start >= clip.end() - OVERLAP_EPSILON {
                        max = max.min(other.start - clip.end());
                    }
                }
            }
            if project.settings.ripple_edit {
                // Followers shift with the clip.
                max = f64::INFINITY;
            }
            Ok((min.min(0.0), max.max(0.0)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_project_model::{AssetKind, ClipKind, MediaAssetMeta, Track, TrackKind};

    const SLIP: GestureModifiers = GestureModifiers {
        alt: true,
        shift: false,
    };
    const SLIDE: GestureModifiers = GestureModifiers {
        alt: true,
        shift: true,
    };

    /// Clips a: [0,2), b: [3,5) with source 2..4 of a 10s asset, c: [6,7).
    fn fixture(ripple: bool) -> Arc<Project> {
        let mut project = Project::new("Gestures");
        project.settings.ripple_edit = ripple;
        project.media_assets.insert(
            "m".into(),
            MediaAssetMeta::new("m", AssetKind::Video, "m.mp4", 10.0).with_id("m"),
        );
        let mut track = Track::new(TrackKind::Video);
        track.clips = vec![
            Clip::new("m", ClipKind::Video, 0.0, 0.0, 2.0).with_id("a"),
            Clip::new("m", ClipKind::Video, 3.0, 2.0, 4.0).with_id("b"),
            Clip::new("m", ClipKind::Video, 6.0, 5.0, 6.0).with_id("c"),
        ];
        project.sequences[0].tracks.push(track);
        project.sequences[0].recompute_duration();
        Arc::new(project)
    }

    fn clip<'a>(project: &'a Project, id: &str) -> &'a Clip {
        project.sequences[0].clip(id).unwrap()
    }

    #[test]
    fn test_modifier_mapping() {
        assert_eq!(SLIP.mode(), Some(GestureMode::Slip));
        assert_eq!(SLIDE.mode(), Some(GestureMode::Slide));
        assert_eq!(GestureModifiers::default().mode(), None);
        let shift_only = GestureModifiers {
            alt: false,
            shift: true,
        };
        assert_eq!(shift_only.mode(), None);
        assert!(SlipSlideGesture::begin(fixture(false), "b", shift_only).is_err());
    }

    #[test]
    fn test_slip_moves_window_and_clamps() {
        let mut gesture = SlipSlideGesture::begin(fixture(false), "b", SLIP).unwrap();
        let p = gesture.update(1.5).unwrap();
        let b = clip(p, "b");
        assert_eq!((b.trim_start, b.trim_end, b.start), (3.5, 5.5, 3.0));

        // Updates are absolute, not cumulative.
        let p = gesture.update(1.5).unwrap();
        assert_eq!(clip(p, "b").trim_start, 3.5);

        let p = gesture.update(100.0).unwrap();
        assert_eq!((clip(p, "b").trim_start, clip(p, "b").trim_end), (8.0, 10.0));
        let p = gesture.update(-100.0).unwrap();
        assert_eq!((clip(p, "b").trim_start, clip(p, "b").trim_end), (0.0, 2.0));
        assert_eq!(gesture.applied_offset(), -2.0);
    }

    #[test]
    fn test_slip_leaves_followers_bit_identical() {
        let mut project = (*fixture(true)).clone();
        project.settings.multi_track_ripple = true;
        let project = Arc::new(project);
        let mut gesture = SlipSlideGesture::begin(Arc::clone(&project), "b", SLIP).unwrap();
        for offset in [0.1, 0.7, 1.3333333, -1.9] {
            let p = gesture.update(offset).unwrap();
            for id in ["a", "b", "c"] {
                assert_eq!(clip(p, id).start.to_bits(), clip(&project, id).start.to_bits());
                assert_eq!(
                    clip(p, id).duration.to_bits(),
                    clip(&project, id).duration.to_bits()
                );
            }
        }
    }

    #[test]
    fn test_slide_clamps_to_neighbors() {
        let mut gesture = SlipSlideGesture::begin(fixture(false), "b", SLIDE).unwrap();
        let p = gesture.update(5.0).unwrap();
        let b = clip(p, "b");
        assert!((b.start - 4.0).abs() < 1e-9, "stops at c");
        assert_eq!((b.trim_start, b.trim_end), (2.0, 4.0));

        let p = gesture.update(-5.0).unwrap();
        assert!((clip(p, "b").start - 2.0).abs() < 1e-9, "stops at a");
        assert!(p.sequences[0].find_overlap().is_none());
    }

    #[test]
    fn test_slide_with_ripple_pushes_followers() {
        let mut gesture = SlipSlideGesture::begin(fixture(true), "b", SLIDE).unwrap();
        let p = gesture.update(3.0).unwrap();
        assert!((clip(p, "b").start - 6.0).abs() < 1e-9);
        assert!((clip(p, "c").start - 9.0).abs() < 1e-9);
        assert!(p.sequences[0].find_overlap().is_none());
    }

    #[test]
    fn test_cancel_restores_exactly() {
        let project = fixture(false);
        let before = clip(&project, "b").clone();
        let mut gesture = SlipSlideGesture::begin(Arc::clone(&project), "b", SLIP).unwrap();
        gesture.update(0.3333).unwrap();
        gesture.update(-0.7777).unwrap();
        let restored = gesture.cancel();
        assert!(Arc::ptr_eq(&restored, &project));
        let after = clip(&restored, "b");
        assert_eq!(after.trim_start.to_bits(), before.trim_start.to_bits());
        assert_eq!(after.trim_end.to_bits(), before.trim_end.to_bits());
        assert_eq!(after.start.to_bits(), before.start.to_bits());
    }

    #[test]
    fn test_commit_returns_edit() {
        let mut gesture = SlipSlideGesture::begin(fixture(false), "b", SLIP).unwrap();
        gesture.update(0.5).unwrap();
        let committed = gesture.commit();
        assert_eq!(clip(&committed, "b").trim_start, 2.5);
    }

    #[test]
    fn test_locked_track_rejected() {
        let mut project = (*fixture(false)).clone();
        project.sequences[0].tracks[0].locked = true;
        let err = SlipSlideGesture::begin(Arc::new(project), "b", SLIDE).unwrap_err();
        assert!(matches!(err, EditError::TrackLocked { .. }));
    }

    #[test]
    fn test_snapped_slide_lands_on_candidate() {
        let project = fixture(false);
        let snapper = SnapManager::new().with_clip_edges([3.5]).with_threshold(0.1);
        let mut gesture = SlipSlideGesture::begin(project, "b", SLIDE).unwrap();
        // End would land at 5.45; start at 3.45 snaps to 3.5.
        let p = gesture.update_snapped(0.45, &snapper).unwrap();
        assert!((clip(p, "b").start - 3.5).abs() < 1e-9);
    }
}
