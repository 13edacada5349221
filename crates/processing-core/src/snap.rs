//! Magnetic snapping for clip boundaries.
//!
//! Candidates come in three kinds with a fixed priority: clip edges, then
//! beat markers, then the grid. When several kinds are within the
//! threshold, the highest-priority kind wins even if a lower one is closer.
//! Within a kind the nearest candidate wins, and an exact tie resolves to
//! the earlier time.

use cutline_common::SnapDefaults;
use cutline_project_model::{playback_time_for_source_position, Project};
use serde::Serialize;

/// Candidate kind, declared in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapKind {
    ClipEdge,
    Beat,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnapCandidate {
    pub time: f64,
    pub kind: SnapKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapResult {
    pub time: f64,
    pub kind: SnapKind,
    /// `|time - proposed|`.
    pub distance: f64,
}

/// Where snap candidates are gathered from, and how far they reach.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapOptions {
    /// Distance in seconds within which a candidate attracts.
    pub threshold_secs: f64,
    /// Grid interval in seconds.
    pub grid_secs: Option<f64>,
    /// Ignore beats that do not open a measure.
    pub downbeats_only: bool,
}

impl From<&SnapDefaults> for SnapOptions {
    fn from(defaults: &SnapDefaults) -> Self {
        Self {
            threshold_secs: defaults.threshold_secs,
            grid_secs: defaults.grid_secs,
            downbeats_only: defaults.downbeats_only,
        }
    }
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self::from(&SnapDefaults::default())
    }
}

/// Snap targets for one drag gesture.
#[derive(Debug, Clone)]
pub struct SnapManager {
    candidates: Vec<SnapCandidate>,
    grid: Option<f64>,
    threshold: f64,
}

impl Default for SnapManager {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            grid: None,
            threshold: SnapDefaults::default().threshold_secs,
        }
    }
}

impl SnapManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Threshold used by [`SnapManager::snap_default`].
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn with_clip_edges(mut self, times: impl IntoIterator<Item = f64>) -> Self {
        self.push(times, SnapKind::ClipEdge);
        self
    }

    pub fn with_beats(mut self, times: impl IntoIterator<Item = f64>) -> Self {
        self.push(times, SnapKind::Beat);
        self
    }

    /// Enable grid snapping. Non-positive intervals disable it.
    pub fn with_grid(mut self, interval: f64) -> Self {
        self.grid = (interval.is_finite() && interval > 0.0).then_some(interval);
        self
    }

    /// Gather candidates from a sequence.
    ///
    /// Clip edges exclude `exclude_clip` (the clip being dragged). Beat
    /// markers of every asset used in the sequence are mapped onto the
    /// timeline through each clip's trim window and speed curve. Returns
    /// `None` if the sequence does not exist.
    pub fn for_sequence(
        project: &Project,
        sequence_id: &str,
        exclude_clip: Option<&str>,
        options: &SnapOptions,
    ) -> Option<Self> {
        let seq = project.sequence(sequence_id)?;
        let mut edges = vec![0.0];
        let mut beats = Vec::new();

        for clip in seq.clips() {
            if exclude_clip == Some(clip.id.as_str()) {
                continue;
            }
            edges.push(clip.start);
            edges.push(clip.end());

            let Some(markers) = project
                .asset(&clip.media_id)
                .and_then(|a| a.beat_markers.as_ref())
            else {
                continue;
            };
            let span = clip.source_span();
            for marker in markers {
                if options.downbeats_only && !marker.is_downbeat() {
                    continue;
                }
                if marker.time < clip.trim_start || marker.time > clip.trim_end {
                    continue;
                }
                let local = playback_time_for_source_position(
                    marker.time - clip.trim_start,
                    clip.speed_curve.as_ref(),
                    span,
                );
                beats.push(clip.start + local);
            }
        }

        let mut manager = Self::new()
            .with_threshold(options.threshold_secs)
            .with_clip_edges(edges)
            .with_beats(beats);
        if let Some(grid) = options.grid_secs {
            manager = manager.with_grid(grid);
        }
        tracing::debug!(
            sequence_id,
            candidates = manager.candidates.len(),
            grid = ?manager.grid,
            threshold = manager.threshold,
            "Snap candidates gathered"
        );
        Some(manager)
    }

    pub fn candidates(&self) -> &[SnapCandidate] {
        &self.candidates
    }

    /// Snap `time` to the best candidate within `threshold` seconds.
    pub fn snap(&self, time: f64, threshold: f64) -> Option<SnapResult> {
        if !time.is_finite() || threshold.is_nan() || threshold < 0.0 {
            return None;
        }
        for kind in [SnapKind::ClipEdge, SnapKind::Beat] {
            let times = self
                .candidates
                .iter()
                .filter(|c| c.kind == kind)
                .map(|c| c.time);
            if let Some(hit) = nearest(time, threshold, times, kind) {
                return Some(hit);
            }
        }
        let grid = self.grid?;
        let below = (time / grid).floor() * grid;
        let points = [below, below + grid].into_iter().filter(|t| *t >= 0.0);
        nearest(time, threshold, points, SnapKind::Grid)
    }

    /// Snap `time` within the manager's own threshold.
    pub fn snap_default(&self, time: f64) -> Option<SnapResult> {
        self.snap(time, self.threshold)
    }

    fn push(&mut self, times: impl IntoIterator<Item = f64>, kind: SnapKind) {
        self.candidates.extend(
            times
                .into_iter()
                .filter(|t| t.is_finite())
                .map(|time| SnapCandidate { time, kind }),
        );
    }
}

fn nearest(
    time: f64,
    threshold: f64,
    points: impl Iterator<Item = f64>,
    kind: SnapKind,
) -> Option<SnapResult> {
    let mut best: Option<SnapResult> = None;
    for point in points {
        let distance = (point - time).abs();
        if distance > threshold {
            continue;
        }
        let better = match best {
            None => true,
            Some(b) => distance < b.distance || (distance == b.distance && point < b.time),
        };
        if better {
            best = Some(SnapResult {
                time: point,
                kind,
                distance,
            });
        }
    }
    best
}
