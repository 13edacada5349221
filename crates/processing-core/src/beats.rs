//! Beat analysis results and the collaborator that produces them.

use async_trait::async_trait;
use cutline_common::{CutlineError, CutlineResult};
use cutline_project_model::edit::merge_derived_metadata;
use cutline_project_model::{BeatMarker, MediaAssetMeta, Project};
use serde::{Deserialize, Serialize};

/// Markers closer than this are considered the same beat.
pub const BEAT_DEDUP_WINDOW: f64 = 1e-3;

/// What an analysis job returns for one audio-bearing URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatAnalysis {
    #[serde(default)]
    pub beat_markers: Vec<BeatMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
}

impl BeatAnalysis {
    pub fn from_json(text: &str) -> CutlineResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Sorted, deduplicated markers; non-positive or non-finite bpm dropped.
    pub fn normalized(self) -> Self {
        Self {
            beat_markers: normalize_beat_markers(self.beat_markers),
            bpm: self.bpm.filter(|b| b.is_finite() && *b > 0.0),
        }
    }
}

/// External beat detector.
#[async_trait]
pub trait BeatAnalyzer: Send + Sync {
    async fn analyze(&self, url: &str) -> CutlineResult<BeatAnalysis>;
}

/// Sort markers by time and merge those within [`BEAT_DEDUP_WINDOW`].
///
/// Invalid times are dropped. A merged marker keeps the strongest strength
/// and is a downbeat if any of its duplicates was.
pub fn normalize_beat_markers(markers: Vec<BeatMarker>) -> Vec<BeatMarker> {
    let mut markers: Vec<BeatMarker> = markers
        .into_iter()
        .filter(|m| m.time.is_finite() && m.time >= 0.0)
        .collect();
    markers.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut out: Vec<BeatMarker> = Vec::with_capacity(markers.len());
    for marker in markers {
        match out.last_mut() {
            Some(prev) if marker.time - prev.time < BEAT_DEDUP_WINDOW => {
                prev.strength = match (prev.strength, marker.strength) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                if marker.is_downbeat() {
                    prev.is_downbeat = Some(true);
                }
            }
            _ => out.push(marker),
        }
    }
    out
}

/// Run the analyzer for one asset and store the normalized markers on it.
pub async fn analyze_asset(
    analyzer: &dyn BeatAnalyzer,
    project: &Project,
    asset_id: &str,
) -> CutlineResult<Project> {
    let asset = project
        .asset(asset_id)
        .ok_or_else(|| CutlineError::validation(format!("asset {asset_id} not found")))?;
    if !asset.has_audio() {
        return Err(CutlineError::unsupported(format!(
            "asset {asset_id} has no audio to analyze"
        )));
    }

    let analysis = analyzer.analyze(&asset.url).await?.normalized();
    tracing::info!(
        asset_id,
        beats = analysis.beat_markers.len(),
        bpm = ?analysis.bpm,
        "Beat analysis stored"
    );

    let mut derived: MediaAssetMeta = asset.clone();
    derived.beat_markers = Some(analysis.beat_markers);
    derived.bpm = analysis.bpm;
    Ok(merge_derived_metadata(project, &derived)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_project_model::AssetKind;

    struct FixedAnalyzer(BeatAnalysis);

    #[async_trait]
    impl BeatAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _url: &str) -> CutlineResult<BeatAnalysis> {
            Ok(self.0.clone())
        }
    }

    fn marker(time: f64, strength: Option<f32>, downbeat: bool) -> BeatMarker {
        BeatMarker {
            time,
            strength,
            is_downbeat: downbeat.then_some(true),
        }
    }

    #[test]
    fn test_normalize_sorts_and_merges() {
        let out = normalize_beat_markers(vec![
            marker(2.0, Some(0.3), false),
            marker(0.5, None, false),
            marker(2.0004, Some(0.9), true),
            marker(f64::NAN, None, false),
            marker(-1.0, None, false),
            marker(1.0, None, false),
        ]);
        let times: Vec<f64> = out.iter().map(|m| m.time).collect();
        assert_eq!(times, vec![0.5, 1.0, 2.0]);
        assert_eq!(out[2].strength, Some(0.9));
        assert!(out[2].is_downbeat());
    }

    #[test]
    fn test_analysis_wire_format() {
        let analysis = BeatAnalysis::from_json(
            r#"{"beatMarkers":[{"time":1.5,"isDownbeat":true},{"time":0.5,"strength":0.4}],"bpm":120}"#,
        )
        .unwrap()
        .normalized();
        assert_eq!(analysis.beat_markers[0].time, 0.5);
        assert_eq!(analysis.bpm, Some(120.0));
        assert!(BeatAnalysis::from_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_analyze_asset_stores_markers() {
        let mut project = Project::new("Beats");
        project.media_assets.insert(
            "song".into(),
            MediaAssetMeta::new("song", AssetKind::Audio, "song.wav", 60.0).with_id("song"),
        );
        project.media_assets.insert(
            "still".into(),
            MediaAssetMeta::new("still", AssetKind::Image, "still.png", 0.0).with_id("still"),
        );
        let analyzer = FixedAnalyzer(BeatAnalysis {
            beat_markers: vec![marker(1.0, None, false), marker(0.5, None, true)],
            bpm: Some(96.0),
        });

        let next = analyze_asset(&analyzer, &project, "song").await.unwrap();
        let song = next.asset("song").unwrap();
        assert_eq!(song.bpm, Some(96.0));
        assert_eq!(song.beat_markers.as_ref().unwrap()[0].time, 0.5);

        let err = analyze_asset(&analyzer, &project, "still").await.unwrap_err();
        assert!(matches!(err, CutlineError::Unsupported { .. }));
        assert!(analyze_asset(&analyzer, &project, "missing").await.is_err());
    }
}
