//! Read-only projection of a sequence for the timeline UI.
//!
//! Everything is keyed by id; the UI never has to infer structure from
//! what it rendered.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::project::{Project, Thumbnail};
use crate::timeline::{ClipKind, TrackKind};
use crate::{AssetId, ClipId, SequenceId, TrackId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceView {
    pub sequence_id: SequenceId,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub ripple_edit: bool,
    /// Top layer first.
    pub tracks: Vec<TrackView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackView {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    pub locked: bool,
    pub muted: bool,
    pub volume: f32,
    pub clips: Vec<ClipView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipView {
    pub id: ClipId,
    pub media_id: AssetId,
    pub label: String,
    pub kind: ClipKind,
    pub start: f64,
    pub end: f64,
    pub trim_start: f64,
    pub trim_end: f64,
    pub variable_speed: bool,
    pub effect_count: usize,
    pub selected: bool,
    /// Asset thumbnails that fall inside the trim window.
    pub thumbnails: Vec<Thumbnail>,
    /// Waveform buckets covering the trim window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Vec<f32>>,
}

impl SequenceView {
    /// Build the projection, or `None` if the sequence does not exist.
    pub fn build(
        project: &Project,
        sequence_id: &str,
        selection: &BTreeSet<ClipId>,
    ) -> Option<Self> {
        let seq = project.sequence(sequence_id)?;
        let tracks = seq
            .tracks
            .iter()
            .map(|track| TrackView {
                id: track.id.clone(),
                name: track.name.clone(),
                kind: track.kind,
                locked: track.locked,
                muted: track.muted,
                volume: track.volume,
                clips: track
                    .clips
                    .iter()
                    .map(|clip| {
                        let asset = project.asset(&clip.media_id);
                        let thumbnails = asset
                            .and_then(|a| a.thumbnails.as_ref())
                            .map(|thumbs| {
                                thumbs
                                    .iter()
                                    .filter(|t| t.time >= clip.trim_start && t.time <= clip.trim_end)
                                    .cloned()
                                    .collect()
                            })
                            .unwrap_or_default();
                        let waveform = asset.and_then(|a| {
                            let wave = a.waveform.as_ref()?;
                            window_buckets(wave, a.duration, clip.trim_start, clip.trim_end)
                        });
                        ClipView {
                            id: clip.id.clone(),
                            media_id: clip.media_id.clone(),
                            label: asset.map(|a| a.name.clone()).unwrap_or_default(),
                            kind: clip.kind,
                            start: clip.start,
                            end: clip.end(),
                            trim_start: clip.trim_start,
                            trim_end: clip.trim_end,
                            variable_speed: clip.speed_curve.is_some(),
                            effect_count: clip.effects.iter().filter(|e| e.enabled).count(),
                            selected: selection.contains(&clip.id),
                            thumbnails,
                            waveform,
                        }
                    })
                    .collect(),
            })
            .collect();

        Some(Self {
            sequence_id: seq.id.clone(),
            name: seq.name.clone(),
            width: seq.width,
            height: seq.height,
            fps: seq.fps,
            duration: seq.duration,
            ripple_edit: project.settings.ripple_edit,
            tracks,
        })
    }
}

/// Slice of a whole-asset waveform covering `[from, to]` seconds.
fn window_buckets(wave: &[f32], duration: f64, from: f64, to: f64) -> Option<Vec<f32>> {
    if wave.is_empty() || duration <= 0.0 {
        return None;
    }
    let per_sec = wave.len() as f64 / duration;
    let lo = ((from * per_sec).floor().max(0.0) as usize).min(wave.len());
    let hi = ((to * per_sec).ceil().max(0.0) as usize).min(wave.len());
    if hi <= lo {
        return None;
    }
    Some(wave[lo..hi].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{AssetKind, MediaAssetMeta};
    use crate::timeline::{Clip, Track};

    #[test]
    fn test_view_is_keyed_and_filtered() {
        let mut project = Project::new("View");
        let mut asset = MediaAssetMeta::new("Interview", AssetKind::Video, "i.mp4", 10.0)
            .with_id("v");
        asset.thumbnails = Some(
            (0..10)
                .map(|i| Thumbnail {
                    time: i as f64,
                    width: 160,
                    height: 90,
                    uri: format!("thumb://v/{i}"),
                })
                .collect(),
        );
        asset.waveform = Some(vec![0.5; 100]);
        project.media_assets.insert("v".into(), asset);

        let mut track = Track::new(TrackKind::Video);
        track
            .clips
            .push(Clip::new("v", ClipKind::Video, 1.0, 2.0, 5.0).with_id("c1"));
        project.sequences[0].tracks.push(track);
        project.sequences[0].recompute_duration();

        let selection: BTreeSet<ClipId> = ["c1".to_string()].into_iter().collect();
        let seq_id = project.sequences[0].id.clone();
        let view = SequenceView::build(&project, &seq_id, &selection).unwrap();

        let clip = &view.tracks[0].clips[0];
        assert_eq!(clip.label, "Interview");
        assert!(clip.selected);
        assert_eq!(clip.thumbnails.len(), 4); // t = 2, 3, 4, 5
        assert_eq!(clip.waveform.as_ref().unwrap().len(), 30);
        assert!((clip.end - 4.0).abs() < 1e-12);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json["tracks"][0]["clips"][0].get("trimStart").is_some());
        assert!(SequenceView::build(&project, "missing", &selection).is_none());
    }
}
