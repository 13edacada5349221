//! Project root aggregate and media asset metadata.
//!
//! A project owns its sequences and a single arena of media assets. Clips
//! refer to assets by id only; reference counts are computed on demand when
//! deciding whether an asset may be removed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::beat::BeatMarker;
use crate::timeline::{ClipKind, Sequence};
use crate::{AssetId, SequenceId};

/// Current project schema version.
pub const PROJECT_VERSION: &str = "1.0";

/// Top-level project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Schema version.
    pub version: String,

    /// Unique project identifier (UUID).
    pub id: String,

    /// Human-readable project name.
    pub name: String,

    /// Creation timestamp (RFC 3339).
    pub created_at: String,

    /// Last modified timestamp (RFC 3339).
    pub modified_at: String,

    /// Compositions in display order.
    #[serde(default)]
    pub sequences: Vec<Sequence>,

    /// Asset arena keyed by id.
    #[serde(default)]
    pub media_assets: BTreeMap<AssetId, MediaAssetMeta>,

    /// Editor-wide settings.
    #[serde(default)]
    pub settings: EditorSettings,
}

/// Editor-wide settings stored with the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorSettings {
    /// Sequence shown in the editor.
    pub active_sequence_id: Option<SequenceId>,

    /// Shift following clips when an edit changes a clip's extent.
    pub ripple_edit: bool,

    /// Ripple across every track instead of only the edited one.
    pub multi_track_ripple: bool,
}

/// Kind of a media asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Audio,
    Image,
}

/// Metadata for an imported or generated media asset.
///
/// Optional fields are derived data filled in as it becomes available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAssetMeta {
    pub id: AssetId,
    pub name: String,

    #[serde(rename = "type")]
    pub kind: AssetKind,

    /// Location the decoder opens (file path or URL).
    pub url: String,

    /// Source duration in seconds (ignored for images).
    #[serde(default)]
    pub duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Vec<Thumbnail>>,

    /// Peak amplitude per bucket [0.0, 1.0].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Vec<f32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat_markers: Option<Vec<BeatMarker>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
}

/// A generated thumbnail reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thumbnail {
    /// Source time the thumbnail was taken at.
    pub time: f64,
    pub width: u32,
    pub height: u32,
    /// Where the UI can fetch the image.
    pub uri: String,
}

impl Project {
    /// Create a new project with one empty 1080p30 sequence.
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let sequence = Sequence::new("Sequence 1", 1920, 1080, 30.0);
        let settings = EditorSettings {
            active_sequence_id: Some(sequence.id.clone()),
            ..EditorSettings::default()
        };
        Self {
            version: PROJECT_VERSION.to_string(),
            id: crate::new_id(),
            name: name.into(),
            created_at: now.clone(),
            modified_at: now,
            sequences: vec![sequence],
            media_assets: BTreeMap::new(),
            settings,
        }
    }

    /// Update `modified_at` to now.
    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn sequence(&self, sequence_id: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.id == sequence_id)
    }

    pub fn sequence_mut(&mut self, sequence_id: &str) -> Option<&mut Sequence> {
        self.sequences.iter_mut().find(|s| s.id == sequence_id)
    }

    /// The active sequence, falling back to the first one.
    pub fn active_sequence(&self) -> Option<&Sequence> {
        self.settings
            .active_sequence_id
            .as_deref()
            .and_then(|id| self.sequence(id))
            .or_else(|| self.sequences.first())
    }

    pub fn asset(&self, asset_id: &str) -> Option<&MediaAssetMeta> {
        self.media_assets.get(asset_id)
    }

    /// Usable source length of an asset (unbounded for images).
    pub fn source_duration(&self, asset_id: &str) -> Option<f64> {
        self.asset(asset_id).map(MediaAssetMeta::source_duration)
    }

    /// Number of clips, across all sequences, that reference `asset_id`.
    pub fn asset_ref_count(&self, asset_id: &str) -> usize {
        self.sequences
            .iter()
            .flat_map(|s| s.clips())
            .filter(|c| c.media_id == asset_id)
            .count()
    }

    /// Ids of assets that no clip references.
    pub fn unreferenced_assets(&self) -> Vec<AssetId> {
        self.media_assets
            .keys()
            .filter(|id| self.asset_ref_count(id) == 0)
            .cloned()
            .collect()
    }

    /// Check model invariants. Returns human-readable problems (empty if valid).
    pub fn validate(&self) -> Vec<String> {
        let mut problems = vec![];

        if let Some(active) = &self.settings.active_sequence_id {
            if self.sequence(active).is_none() {
                problems.push(format!("Active sequence {active} does not exist"));
            }
        }

        for seq in &self.sequences {
            for track in &seq.tracks {
                if let Some((a, b)) = track.find_overlap() {
                    problems.push(format!(
                        "Clips {a} and {b} overlap on track {}",
                        track.id
                    ));
                }
                for clip in &track.clips {
                    if !track.kind.accepts(clip.kind) {
                        problems.push(format!(
                            "Clip {} ({:?}) is on a {:?} track",
                            clip.id, clip.kind, track.kind
                        ));
                    }
                    match self.source_duration(&clip.media_id) {
                        None => problems.push(format!(
                            "Clip {} references missing asset {}",
                            clip.id, clip.media_id
                        )),
                        Some(source) => {
                            if !(clip.trim_start >= 0.0
                                && clip.trim_start < clip.trim_end
                                && clip.trim_end <= source + 1e-9)
                            {
                                problems.push(format!(
                                    "Clip {} trim window [{}, {}] outside source [0, {}]",
                                    clip.id, clip.trim_start, clip.trim_end, source
                                ));
                            }
                        }
                    }
                    let expected = clip.computed_duration();
                    if (clip.duration - expected).abs() > expected.max(1.0) * 1e-3 {
                        problems.push(format!(
                            "Clip {} duration {} does not match its trim window ({expected})",
                            clip.id, clip.duration
                        ));
                    }
                }
            }
            if (seq.duration - seq.computed_duration()).abs() > 1e-9 {
                problems.push(format!(
                    "Sequence {} duration {} is stale (expected {})",
                    seq.id,
                    seq.duration,
                    seq.computed_duration()
                ));
            }
        }

        problems
    }
}

impl MediaAssetMeta {
    pub fn new(
        name: impl Into<String>,
        kind: AssetKind,
        url: impl Into<String>,
        duration: f64,
    ) -> Self {
        Self {
            id: crate::new_id(),
            name: name.into(),
            kind,
            url: url.into(),
            duration,
            width: None,
            height: None,
            fps: None,
            sample_rate: None,
            thumbnails: None,
            waveform: None,
            beat_markers: None,
            bpm: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<AssetId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Usable source length (unbounded for still images).
    pub fn source_duration(&self) -> f64 {
        match self.kind {
            AssetKind::Image => f64::INFINITY,
            _ => self.duration.max(0.0),
        }
    }

    /// Both dimensions known and non-zero.
    pub fn has_known_dimensions(&self) -> bool {
        matches!((self.width, self.height), (Some(w), Some(h)) if w > 0 && h > 0)
    }

    pub fn has_video(&self) -> bool {
        matches!(self.kind, AssetKind::Video | AssetKind::Image)
    }

    pub fn has_audio(&self) -> bool {
        match self.kind {
            AssetKind::Audio => true,
            AssetKind::Video => self.sample_rate.is_some(),
            AssetKind::Image => false,
        }
    }

    /// Clip kind that plays this asset.
    pub fn clip_kind(&self) -> ClipKind {
        match self.kind {
            AssetKind::Video => ClipKind::Video,
            AssetKind::Audio => ClipKind::Audio,
            AssetKind::Image => ClipKind::Image,
        }
    }

    /// Local file path, if `url` refers to one.
    pub fn local_path(&self) -> Option<PathBuf> {
        if let Some(rest) = self.url.strip_prefix("file://") {
            return Some(PathBuf::from(rest));
        }
        if self.url.contains("://") {
            return None;
        }
        Some(PathBuf::from(&self.url))
    }
}

/// Errors that can occur when loading or saving projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Project not found: {id}")]
    NotFound { id: String },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

impl From<ProjectError> for cutline_common::CutlineError {
    fn from(err: ProjectError) -> Self {
        cutline_common::CutlineError::persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Clip, Track, TrackKind};

    #[test]
    fn test_project_creation() {
        let project = Project::new("Trailer");
        assert_eq!(project.name, "Trailer");
        assert_eq!(project.version, PROJECT_VERSION);
        assert_eq!(project.sequences.len(), 1);
        assert_eq!(
            project.active_sequence().map(|s| s.id.clone()),
            project.settings.active_sequence_id
        );
        assert!(uuid::Uuid::parse_str(&project.id).is_ok());
    }

    #[test]
    fn test_project_serialization_is_camel_case() {
        let mut project = Project::new("Test");
        let asset = MediaAssetMeta::new("clip.mp4", AssetKind::Video, "/tmp/clip.mp4", 12.0)
            .with_id("a1");
        project.media_assets.insert(asset.id.clone(), asset);

        let json = serde_json::to_value(&project).unwrap();
        assert!(json.get("mediaAssets").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["mediaAssets"]["a1"]["type"], "video");
        assert!(json["mediaAssets"]["a1"].get("width").is_none());

        let parsed: Project = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, project);
    }

    #[test]
    fn test_image_source_is_unbounded() {
        let image = MediaAssetMeta::new("logo.png", AssetKind::Image, "logo.png", 0.0);
        assert!(image.source_duration().is_infinite());
        assert!(!image.has_audio());
    }

    #[test]
    fn test_known_dimensions_requires_both_non_zero() {
        let mut asset = MediaAssetMeta::new("v", AssetKind::Video, "v.mp4", 1.0);
        assert!(!asset.has_known_dimensions());
        asset.width = Some(1920);
        assert!(!asset.has_known_dimensions());
        asset.height = Some(0);
        assert!(!asset.has_known_dimensions());
        asset.height = Some(1080);
        assert!(asset.has_known_dimensions());
    }

    #[test]
    fn test_local_path() {
        let a = MediaAssetMeta::new("a", AssetKind::Video, "file:///media/a.mp4", 1.0);
        assert_eq!(a.local_path(), Some(PathBuf::from("/media/a.mp4")));
        let b = MediaAssetMeta::new("b", AssetKind::Video, "https://cdn/b.mp4", 1.0);
        assert_eq!(b.local_path(), None);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut project = Project::new("Broken");
        let mut track = Track::new(TrackKind::Video);
        track
            .clips
            .push(Clip::new("missing", ClipKind::Video, 0.0, 0.0, 5.0));
        project.sequences[0].tracks.push(track);

        let problems = project.validate();
        assert!(problems.iter().any(|p| p.contains("missing asset")));
        assert!(problems.iter().any(|p| p.contains("stale")));

        project.sequences[0].recompute_duration();
        project.media_assets.insert(
            "missing".into(),
            MediaAssetMeta::new("m", AssetKind::Video, "m.mp4", 10.0).with_id("missing"),
        );
        assert!(project.validate().is_empty());
    }
}
