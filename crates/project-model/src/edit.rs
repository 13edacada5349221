//! Pure edit operations.
//!
//! Every function takes the current [`Project`] by reference and returns a
//! new one, leaving the input untouched on error. Each mutation re-sorts the
//! touched tracks, rejects overlaps on tracks that forbid them, and
//! recomputes the sequence duration.

use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::project::{EditorSettings, MediaAssetMeta, Project};
use crate::speed::{source_position_for_playback_time, SpeedCurve};
use crate::timeline::{Clip, Sequence, Track, TransitionEdge, OVERLAP_EPSILON};
use crate::{AssetId, ClipId, TrackId};

/// A rejected edit. The input project is unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("Clip {clip_id} would overlap clip {other_clip_id} on track {track_id}")]
    Overlap {
        track_id: TrackId,
        clip_id: ClipId,
        other_clip_id: ClipId,
    },

    #[error("Clip not found: {clip_id}")]
    ClipNotFound { clip_id: ClipId },

    #[error("Track not found: {track_id}")]
    TrackNotFound { track_id: TrackId },

    #[error("Sequence not found: {sequence_id}")]
    SequenceNotFound { sequence_id: String },

    #[error("Asset not found: {asset_id}")]
    AssetNotFound { asset_id: AssetId },

    #[error("Invalid trim for clip {clip_id}: {message}")]
    InvalidTrim { clip_id: ClipId, message: String },

    #[error("Cannot split clip {clip_id} at {at}: not strictly inside the clip")]
    InvalidSplit { clip_id: ClipId, at: f64 },

    #[error("Track {track_id} is locked")]
    TrackLocked { track_id: TrackId },

    #[error("Asset {asset_id} is still referenced by {references} clip(s)")]
    AssetInUse {
        asset_id: AssetId,
        references: usize,
    },

    #[error("Clip {clip_id} cannot be placed on track {track_id}")]
    IncompatibleTrack { clip_id: ClipId, track_id: TrackId },

    #[error("Invalid track order: {message}")]
    InvalidTrackOrder { message: String },

    #[error("Invalid edit: {message}")]
    InvalidValue { message: String },
}

impl From<EditError> for cutline_common::CutlineError {
    fn from(err: EditError) -> Self {
        cutline_common::CutlineError::validation(err.to_string())
    }
}

/// Partial update of track flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackUpdate {
    pub name: Option<String>,
    pub locked: Option<bool>,
    pub muted: Option<bool>,
    pub volume: Option<f32>,
    pub allow_overlap: Option<bool>,
}

/// Partial update of clip properties that do not move its source window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClipUpdate {
    pub opacity: Option<f32>,
    pub volume: Option<f32>,
    /// `Some(None)` removes the curve.
    pub speed_curve: Option<Option<SpeedCurve>>,
    pub effects: Option<Vec<Effect>>,
    pub transitions: Option<Vec<crate::timeline::Transition>>,
}

#[derive(Debug, Clone, Copy)]
struct ClipLoc {
    seq: usize,
    track: usize,
    clip: usize,
}

/// Place `clip` on `track_id`. With ripple, clips at or after the insertion
/// point move right by the clip's duration.
pub fn insert_clip(project: &Project, track_id: &str, clip: Clip) -> Result<Project, EditError> {
    let (si, ti) = locate_track(project, track_id)?;
    let track = &project.sequences[si].tracks[ti];
    ensure_unlocked(track)?;
    if !track.kind.accepts(clip.kind) {
        return Err(EditError::IncompatibleTrack {
            clip_id: clip.id,
            track_id: track.id.clone(),
        });
    }
    if locate_clip(project, &clip.id).is_ok() {
        return Err(EditError::InvalidValue {
            message: format!("clip id {} already exists", clip.id),
        });
    }
    if !clip.start.is_finite() || clip.start < 0.0 {
        return Err(EditError::InvalidValue {
            message: format!("clip start {} must be a non-negative time", clip.start),
        });
    }
    check_window(project, &clip.id, &clip.media_id, clip.trim_start, clip.trim_end)?;

    let mut clip = clip;
    if let Some(curve) = clip.speed_curve.as_mut() {
        curve.normalize();
    }
    clip.recompute_duration();
    let clip_id = clip.id.clone();

    let mut next = project.clone();
    let settings = next.settings.clone();
    let seq = &mut next.sequences[si];
    let targets = ripple_targets(&settings, seq, ti);
    shift_followers(seq, &targets, clip.start, clip.duration, None);
    seq.tracks[ti].clips.push(clip);

    finish(&mut next, si, &with_track(targets, ti), Some(&clip_id))?;
    Ok(next)
}

/// Move a clip to `new_start`, optionally onto another track of the same
/// sequence. With ripple, clips after its original end follow by the delta.
pub fn move_clip(
    project: &Project,
    clip_id: &str,
    new_start: f64,
    target_track_id: Option<&str>,
) -> Result<Project, EditError> {
    if !new_start.is_finite() {
        return Err(EditError::InvalidValue {
            message: format!("clip start {new_start} is not finite"),
        });
    }
    let loc = locate_clip(project, clip_id)?;
    let seq = &project.sequences[loc.seq];
    ensure_unlocked(&seq.tracks[loc.track])?;

    let dst = match target_track_id {
        Some(id) => {
            let (si, ti) = locate_track(project, id)?;
            if si != loc.seq {
                return Err(EditError::InvalidValue {
                    message: "clips cannot move between sequences".to_string(),
                });
            }
            ti
        }
        None => loc.track,
    };
    let dst_track = &seq.tracks[dst];
    ensure_unlocked(dst_track)?;
    let original = &seq.tracks[loc.track].clips[loc.clip];
    if !dst_track.kind.accepts(original.kind) {
        return Err(EditError::IncompatibleTrack {
            clip_id: clip_id.to_string(),
            track_id: dst_track.id.clone(),
        });
    }

    let mut next = project.clone();
    let settings = next.settings.clone();
    let seq = &mut next.sequences[loc.seq];
    let mut clip = seq.tracks[loc.track].clips.remove(loc.clip);
    let old_start = clip.start;
    let old_end = clip.end();
    clip.start = new_start.max(0.0);
    let delta = clip.start - old_start;

    let targets = ripple_targets(&settings, seq, loc.track);
    shift_followers(seq, &targets, old_end, delta, None);
    seq.tracks[dst].clips.push(clip);

    let touched = with_track(with_track(targets, loc.track), dst);
    finish(&mut next, loc.seq, &touched, Some(clip_id))?;
    Ok(next)
}

/// Set a clip's source window. The timeline start stays put; the duration
/// follows the window through the speed curve.
pub fn trim_clip(
    project: &Project,
    clip_id: &str,
    trim_start: f64,
    trim_end: f64,
) -> Result<Project, EditError> {
    let loc = locate_clip(project, clip_id)?;
    let track = &project.sequences[loc.seq].tracks[loc.track];
    ensure_unlocked(track)?;
    let media_id = track.clips[loc.clip].media_id.clone();
    check_window(project, clip_id, &media_id, trim_start, trim_end)?;

    let mut next = project.clone();
    let settings = next.settings.clone();
    let seq = &mut next.sequences[loc.seq];
    let clip = &mut seq.tracks[loc.track].clips[loc.clip];
    let old_end = clip.end();
    let old_duration = clip.duration;
    clip.trim_start = trim_start;
    clip.trim_end = trim_end;
    clip.recompute_duration();
    let delta = clip.duration - old_duration;

    let targets = ripple_targets(&settings, seq, loc.track);
    shift_followers(seq, &targets, old_end, delta, Some(clip_id));

    finish(&mut next, loc.seq, &with_track(targets, loc.track), Some(clip_id))?;
    Ok(next)
}

/// Move a clip's source window by `offset` seconds without touching its
/// timeline placement. Nothing else on the timeline moves.
pub fn slip_clip(project: &Project, clip_id: &str, offset: f64) -> Result<Project, EditError> {
    let loc = locate_clip(project, clip_id)?;
    let track = &project.sequences[loc.seq].tracks[loc.track];
    ensure_unlocked(track)?;
    let clip = &track.clips[loc.clip];
    let (trim_start, trim_end) = (clip.trim_start + offset, clip.trim_end + offset);
    check_window(project, clip_id, &clip.media_id, trim_start, trim_end)?;

    let mut next = project.clone();
    let clip = &mut next.sequences[loc.seq].tracks[loc.track].clips[loc.clip];
    clip.trim_start = trim_start;
    clip.trim_end = trim_end;
    Ok(next)
}

/// Split a clip at timeline time `at`, strictly inside the clip.
///
/// Returns the new project and the id of the right half. The halves keep
/// the original timeline placement exactly; the speed curve is cut at the
/// matching source position with a boundary keyframe on each side.
pub fn split_clip(project: &Project, clip_id: &str, at: f64) -> Result<(Project, ClipId), EditError> {
    let loc = locate_clip(project, clip_id)?;
    let track = &project.sequences[loc.seq].tracks[loc.track];
    ensure_unlocked(track)?;
    let clip = &track.clips[loc.clip];

    let invalid = || EditError::InvalidSplit {
        clip_id: clip_id.to_string(),
        at,
    };
    if !(at > clip.start + OVERLAP_EPSILON && at < clip.end() - OVERLAP_EPSILON) {
        return Err(invalid());
    }

    let local = at - clip.start;
    let span = clip.source_span();
    if !span.is_finite() || span <= 0.0 {
        return Err(invalid());
    }
    let offset = source_position_for_playback_time(local, clip.speed_curve.as_ref(), span);
    if offset <= 0.0 || offset >= span {
        return Err(invalid());
    }
    let split_source = clip.trim_start + offset;

    let mut left = clip.clone();
    let mut right = clip.clone();
    right.id = crate::new_id();
    let right_id = right.id.clone();

    left.trim_end = split_source;
    right.trim_start = split_source;
    if let Some(curve) = &clip.speed_curve {
        let (l, r) = curve.split_at(offset / span);
        left.speed_curve = Some(l);
        right.speed_curve = Some(r);
    }
    left.duration = local;
    right.start = at;
    right.duration = clip.end() - at;

    left.transitions.retain(|t| t.edge == TransitionEdge::In);
    right.transitions.retain(|t| t.edge == TransitionEdge::Out);
    for effect in &mut right.effects {
        effect.id = crate::new_id();
    }
    for transition in &mut right.transitions {
        transition.id = crate::new_id();
    }

    let mut next = project.clone();
    let clips = &mut next.sequences[loc.seq].tracks[loc.track].clips;
    clips[loc.clip] = left;
    clips.push(right);

    finish(&mut next, loc.seq, &[loc.track], Some(clip_id))?;
    Ok((next, right_id))
}

/// Remove clips. With ripple, followers close each gap.
pub fn delete_clips(project: &Project, clip_ids: &[ClipId]) -> Result<Project, EditError> {
    let mut targets = Vec::with_capacity(clip_ids.len());
    for id in clip_ids {
        let loc = locate_clip(project, id)?;
        ensure_unlocked(&project.sequences[loc.seq].tracks[loc.track])?;
        let clip = &project.sequences[loc.seq].tracks[loc.track].clips[loc.clip];
        if !targets.iter().any(|(_, _, c): &(usize, usize, Clip)| c.id == clip.id) {
            targets.push((loc.seq, loc.track, clip.clone()));
        }
    }

    let mut next = project.clone();
    let settings = next.settings.clone();

    // Latest first so earlier gaps shift the already-closed later ones once.
    targets.sort_by(|a, b| b.2.start.total_cmp(&a.2.start));

    let mut touched: Vec<(usize, Vec<usize>)> = Vec::new();
    for (si, ti, clip) in &targets {
        let seq = &mut next.sequences[*si];
        seq.tracks[*ti].clips.retain(|c| c.id != clip.id);
        let ripple = ripple_targets(&settings, seq, *ti);
        shift_followers(seq, &ripple, clip.end(), -clip.duration, None);

        let tracks = with_track(ripple, *ti);
        match touched.iter_mut().find(|(s, _)| s == si) {
            Some((_, list)) => {
                for t in tracks {
                    if !list.contains(&t) {
                        list.push(t);
                    }
                }
            }
            None => touched.push((*si, tracks)),
        }
    }

    for (si, tracks) in &touched {
        finish(&mut next, *si, tracks, None)?;
    }
    Ok(next)
}

/// Reorder a sequence's tracks. `order` must be a permutation of its track ids.
pub fn reorder_tracks(
    project: &Project,
    sequence_id: &str,
    order: &[TrackId],
) -> Result<Project, EditError> {
    let seq = project
        .sequence(sequence_id)
        .ok_or_else(|| EditError::SequenceNotFound {
            sequence_id: sequence_id.to_string(),
        })?;
    if order.len() != seq.tracks.len() {
        return Err(EditError::InvalidTrackOrder {
            message: format!(
                "expected {} track ids, got {}",
                seq.tracks.len(),
                order.len()
            ),
        });
    }

    let mut reordered = Vec::with_capacity(order.len());
    for (i, id) in order.iter().enumerate() {
        if order[..i].contains(id) {
            return Err(EditError::InvalidTrackOrder {
                message: format!("track {id} listed twice"),
            });
        }
        let track = seq.track(id).ok_or_else(|| EditError::TrackNotFound {
            track_id: id.clone(),
        })?;
        reordered.push(track.clone());
    }

    let mut next = project.clone();
    if let Some(seq) = next.sequence_mut(sequence_id) {
        seq.tracks = reordered;
    }
    Ok(next)
}

/// Add a track at `index` (appended at the bottom when `None`).
pub fn add_track(
    project: &Project,
    sequence_id: &str,
    track: Track,
    index: Option<usize>,
) -> Result<Project, EditError> {
    let si = project
        .sequences
        .iter()
        .position(|s| s.id == sequence_id)
        .ok_or_else(|| EditError::SequenceNotFound {
            sequence_id: sequence_id.to_string(),
        })?;
    if locate_track(project, &track.id).is_ok() {
        return Err(EditError::InvalidValue {
            message: format!("track id {} already exists", track.id),
        });
    }
    for clip in &track.clips {
        if !track.kind.accepts(clip.kind) {
            return Err(EditError::IncompatibleTrack {
                clip_id: clip.id.clone(),
                track_id: track.id.clone(),
            });
        }
        check_window(project, &clip.id, &clip.media_id, clip.trim_start, clip.trim_end)?;
    }

    let mut next = project.clone();
    let seq = &mut next.sequences[si];
    let at = index.unwrap_or(seq.tracks.len()).min(seq.tracks.len());
    seq.tracks.insert(at, track);
    finish(&mut next, si, &[at], None)?;
    Ok(next)
}

/// Remove a track and its clips.
pub fn remove_track(project: &Project, track_id: &str) -> Result<Project, EditError> {
    let (si, ti) = locate_track(project, track_id)?;
    ensure_unlocked(&project.sequences[si].tracks[ti])?;

    let mut next = project.clone();
    next.sequences[si].tracks.remove(ti);
    next.sequences[si].recompute_duration();
    Ok(next)
}

/// Change track flags. Locking does not block this.
pub fn update_track(
    project: &Project,
    track_id: &str,
    update: &TrackUpdate,
) -> Result<Project, EditError> {
    let (si, ti) = locate_track(project, track_id)?;

    let mut next = project.clone();
    let track = &mut next.sequences[si].tracks[ti];
    if let Some(name) = &update.name {
        track.name = name.clone();
    }
    if let Some(locked) = update.locked {
        track.locked = locked;
    }
    if let Some(muted) = update.muted {
        track.muted = muted;
    }
    if let Some(volume) = update.volume {
        track.volume = clamp_gain(volume);
    }
    if let Some(allow) = update.allow_overlap {
        track.allow_overlap = allow;
    }
    finish(&mut next, si, &[ti], None)?;
    Ok(next)
}

/// Change clip properties. A new speed curve changes the duration and
/// ripples like a trim.
pub fn update_clip(
    project: &Project,
    clip_id: &str,
    update: &ClipUpdate,
) -> Result<Project, EditError> {
    let loc = locate_clip(project, clip_id)?;
    ensure_unlocked(&project.sequences[loc.seq].tracks[loc.track])?;

    let mut next = project.clone();
    let settings = next.settings.clone();
    let seq = &mut next.sequences[loc.seq];
    let clip = &mut seq.tracks[loc.track].clips[loc.clip];
    let old_end = clip.end();
    let old_duration = clip.duration;

    if let Some(opacity) = update.opacity {
        clip.opacity = opacity.clamp(0.0, 1.0);
    }
    if let Some(volume) = update.volume {
        clip.volume = clamp_gain(volume);
    }
    if let Some(effects) = &update.effects {
        clip.effects = effects.clone();
    }
    if let Some(transitions) = &update.transitions {
        clip.transitions = transitions.clone();
    }
    if let Some(curve) = &update.speed_curve {
        clip.speed_curve = curve.clone().map(|mut c| {
            c.normalize();
            c
        });
        clip.recompute_duration();
    }
    let delta = clip.duration - old_duration;

    let targets = if delta.abs() > 0.0 {
        let targets = ripple_targets(&settings, seq, loc.track);
        shift_followers(seq, &targets, old_end, delta, Some(clip_id));
        targets
    } else {
        vec![]
    };

    finish(&mut next, loc.seq, &with_track(targets, loc.track), Some(clip_id))?;
    Ok(next)
}

/// Add an asset, or replace the metadata of an existing one with the same id.
pub fn add_asset(project: &Project, asset: MediaAssetMeta) -> Result<Project, EditError> {
    if !asset.duration.is_finite() || asset.duration < 0.0 {
        return Err(EditError::InvalidValue {
            message: format!("asset {} has invalid duration {}", asset.id, asset.duration),
        });
    }
    let mut next = project.clone();
    next.media_assets.insert(asset.id.clone(), asset);
    Ok(next)
}

/// Copy derived fields (dimensions, thumbnails, waveform, beats) that are
/// present on `derived` onto the project's asset with the same id.
pub fn merge_derived_metadata(
    project: &Project,
    derived: &MediaAssetMeta,
) -> Result<Project, EditError> {
    if !project.media_assets.contains_key(&derived.id) {
        return Err(EditError::AssetNotFound {
            asset_id: derived.id.clone(),
        });
    }
    let mut next = project.clone();
    if let Some(asset) = next.media_assets.get_mut(&derived.id) {
        if derived.has_known_dimensions() {
            asset.width = derived.width;
            asset.height = derived.height;
        }
        if derived.fps.is_some() {
            asset.fps = derived.fps;
        }
        if derived.sample_rate.is_some() {
            asset.sample_rate = derived.sample_rate;
        }
        if derived.thumbnails.is_some() {
            asset.thumbnails = derived.thumbnails.clone();
        }
        if derived.waveform.is_some() {
            asset.waveform = derived.waveform.clone();
        }
        if derived.beat_markers.is_some() {
            asset.beat_markers = derived.beat_markers.clone();
        }
        if derived.bpm.is_some() {
            asset.bpm = derived.bpm;
        }
    }
    Ok(next)
}

/// Remove an asset. Refused while any clip references it.
pub fn remove_asset(project: &Project, asset_id: &str) -> Result<Project, EditError> {
    if !project.media_assets.contains_key(asset_id) {
        return Err(EditError::AssetNotFound {
            asset_id: asset_id.to_string(),
        });
    }
    let references = project.asset_ref_count(asset_id);
    if references > 0 {
        return Err(EditError::AssetInUse {
            asset_id: asset_id.to_string(),
            references,
        });
    }
    let mut next = project.clone();
    next.media_assets.remove(asset_id);
    Ok(next)
}

/// Drop every asset no clip references. Returns the removed ids.
pub fn purge_unreferenced_assets(project: &Project) -> (Project, Vec<AssetId>) {
    let unused = project.unreferenced_assets();
    let mut next = project.clone();
    for id in &unused {
        next.media_assets.remove(id);
    }
    (next, unused)
}

pub fn set_ripple_mode(project: &Project, ripple_edit: bool, multi_track_ripple: bool) -> Project {
    let mut next = project.clone();
    next.settings.ripple_edit = ripple_edit;
    next.settings.multi_track_ripple = multi_track_ripple;
    next
}

pub fn set_active_sequence(project: &Project, sequence_id: &str) -> Result<Project, EditError> {
    if project.sequence(sequence_id).is_none() {
        return Err(EditError::SequenceNotFound {
            sequence_id: sequence_id.to_string(),
        });
    }
    let mut next = project.clone();
    next.settings.active_sequence_id = Some(sequence_id.to_string());
    Ok(next)
}

/// Append a sequence.
pub fn add_sequence(project: &Project, mut sequence: Sequence) -> Result<Project, EditError> {
    if project.sequence(&sequence.id).is_some() {
        return Err(EditError::InvalidValue {
            message: format!("sequence id {} already exists", sequence.id),
        });
    }
    if let Some((track_id, clip_id, other_clip_id)) = sequence.find_overlap() {
        return Err(EditError::Overlap {
            track_id,
            clip_id,
            other_clip_id,
        });
    }
    sequence.recompute_duration();
    let mut next = project.clone();
    next.sequences.push(sequence);
    Ok(next)
}

fn locate_track(project: &Project, track_id: &str) -> Result<(usize, usize), EditError> {
    project
        .sequences
        .iter()
        .enumerate()
        .find_map(|(si, s)| s.track_index(track_id).map(|ti| (si, ti)))
        .ok_or_else(|| EditError::TrackNotFound {
            track_id: track_id.to_string(),
        })
}

fn locate_clip(project: &Project, clip_id: &str) -> Result<ClipLoc, EditError> {
    project
        .sequences
        .iter()
        .enumerate()
        .find_map(|(si, s)| {
            s.locate_clip(clip_id).map(|(ti, ci)| ClipLoc {
                seq: si,
                track: ti,
                clip: ci,
            })
        })
        .ok_or_else(|| EditError::ClipNotFound {
            clip_id: clip_id.to_string(),
        })
}

fn ensure_unlocked(track: &Track) -> Result<(), EditError> {
    if track.locked {
        return Err(EditError::TrackLocked {
            track_id: track.id.clone(),
        });
    }
    Ok(())
}

/// `0 ≤ trim_start < trim_end ≤ source_duration`.
fn check_window(
    project: &Project,
    clip_id: &str,
    media_id: &str,
    trim_start: f64,
    trim_end: f64,
) -> Result<(), EditError> {
    let source = project
        .source_duration(media_id)
        .ok_or_else(|| EditError::AssetNotFound {
            asset_id: media_id.to_string(),
        })?;
    let invalid = |message: String| EditError::InvalidTrim {
        clip_id: clip_id.to_string(),
        message,
    };

    if !trim_start.is_finite() || !trim_end.is_finite() {
        return Err(invalid("trim points must be finite".to_string()));
    }
    if trim_start < 0.0 {
        return Err(invalid(format!("trim start {trim_start} is negative")));
    }
    if trim_start >= trim_end {
        return Err(invalid(format!(
            "trim start {trim_start} is not before trim end {trim_end}"
        )));
    }
    if trim_end > source + 1e-9 {
        return Err(invalid(format!(
            "trim end {trim_end} is past the source duration {source}"
        )));
    }
    Ok(())
}

/// Tracks a ripple on `track_index` shifts.
fn ripple_targets(settings: &EditorSettings, seq: &Sequence, track_index: usize) -> Vec<usize> {
    if !settings.ripple_edit {
        return vec![];
    }
    if settings.multi_track_ripple {
        seq.tracks
            .iter()
            .enumerate()
            .filter(|(i, t)| *i == track_index || !t.locked)
            .map(|(i, _)| i)
            .collect()
    } else {
        vec![track_index]
    }
}

/// Shift clips starting at or after `from` by `delta`.
fn shift_followers(
    seq: &mut Sequence,
    tracks: &[usize],
    from: f64,
    delta: f64,
    exclude: Option<&str>,
) {
    if delta == 0.0 {
        return;
    }
    for &ti in tracks {
        for clip in &mut seq.tracks[ti].clips {
            if exclude == Some(clip.id.as_str()) {
                continue;
            }
            if clip.start >= from - OVERLAP_EPSILON {
                clip.start = (clip.start + delta).max(0.0);
            }
        }
    }
}

fn with_track(mut tracks: Vec<usize>, track: usize) -> Vec<usize> {
    if !tracks.contains(&track) {
        tracks.push(track);
    }
    tracks
}

fn clamp_gain(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 2.0)
    } else {
        1.0
    }
}

/// Sort and validate touched tracks, then recompute the sequence duration.
fn finish(
    project: &mut Project,
    seq_index: usize,
    touched: &[usize],
    subject: Option<&str>,
) -> Result<(), EditError> {
    let seq = &mut project.sequences[seq_index];
    for &ti in touched {
        let track = &mut seq.tracks[ti];
        track.sort_clips();
        if let Some((a, b)) = track.find_overlap() {
            let (clip_id, other_clip_id) = if subject == Some(a.as_str()) {
                (a, b)
            } else {
                (b, a)
            };
            return Err(EditError::Overlap {
                track_id: track.id.clone(),
                clip_id,
                other_clip_id,
            });
        }
    }
    seq.recompute_duration();
    Ok(())
}
