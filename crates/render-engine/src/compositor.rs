//! Frame compositor and audio mixer shared by playback and export.
//!
//! Both paths go through [`FrameCompositor`], so a preview frame and an
//! exported frame for the same sequence time are built by the same code.
//! They differ only in the [`FetchPolicy`]: playback waits at most a frame
//! budget for decodes, export always waits.
//!
//! State that belongs to one consumer lives in its [`RenderScope`]: the
//! last good frame of each clip and the owner tag of the decodes it starts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cutline_common::{CutlineError, CutlineResult, FrameClock};
use cutline_media_cache::{JobOwner, MediaAssetCache};
use cutline_processing_core::EffectsPipeline;
use cutline_project_model::{
    ActiveClip, AudioBuffer, Clip, ClipId, ClipKind, FrameBuffer, Project, Sequence, TrackKind,
};
use futures::future::join_all;
use tokio::time::Instant;

/// Canvas color under the bottom layer.
pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Output channel count of the audio mix.
pub const MIX_CHANNELS: u16 = 2;

/// Source-time anchors for variable-speed audio are computed every this many
/// sample frames and interpolated in between.
const SPEED_ANCHOR_STRIDE: usize = 256;

/// How long a composition or mix may wait for decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Wait for every decode to finish.
    Wait,
    /// Give up on decodes still running after this long.
    Budget(Duration),
    /// Give up on decodes still running at this instant.
    Deadline(Instant),
}

impl FetchPolicy {
    fn deadline(self) -> Option<Instant> {
        match self {
            FetchPolicy::Wait => None,
            FetchPolicy::Budget(budget) => Some(Instant::now() + budget),
            FetchPolicy::Deadline(at) => Some(at),
        }
    }
}

/// One consumer's view of the compositor.
///
/// Fallback frames never leak between scopes, and cancelling a scope's
/// decodes leaves decodes other scopes wait for running.
#[derive(Debug)]
pub struct RenderScope {
    owner: JobOwner,
    last_good: Mutex<HashMap<ClipId, Arc<FrameBuffer>>>,
}

impl Default for RenderScope {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScope {
    pub fn new() -> Self {
        Self {
            owner: JobOwner::unique(),
            last_good: Mutex::new(HashMap::new()),
        }
    }

    pub fn owner(&self) -> JobOwner {
        self.owner
    }

    /// Forget last-good frames (after a seek or when the project changes).
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn remember(&self, clip_id: &str, frame: &Arc<FrameBuffer>) {
        self.lock().insert(clip_id.to_string(), Arc::clone(frame));
    }

    fn stale_or_missing(&self, clip_id: &str) -> Fetched {
        match self.lock().get(clip_id) {
            Some(frame) => Fetched::Stale(Arc::clone(frame)),
            None => Fetched::Missing,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClipId, Arc<FrameBuffer>>> {
        self.last_good.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A composed picture plus what it took to build it.
#[derive(Debug, Clone)]
pub struct ComposedFrame {
    pub frame: FrameBuffer,
    /// Sequence time the frame shows.
    pub time: f64,
    /// Layers drawn from a decode that finished in time.
    pub fresh_layers: usize,
    /// Layers drawn from the clip's last good frame after a miss.
    pub stale_layers: usize,
    /// Layers left out entirely.
    pub missing_layers: usize,
}

impl ComposedFrame {
    /// Every visible layer was freshly decoded.
    pub fn is_complete(&self) -> bool {
        self.stale_layers == 0 && self.missing_layers == 0
    }
}

enum Fetched {
    Fresh(Arc<FrameBuffer>),
    Stale(Arc<FrameBuffer>),
    Missing,
}

/// Composes sequence frames from the media cache and the effects pipeline.
pub struct FrameCompositor {
    cache: Arc<MediaAssetCache>,
    effects: Arc<EffectsPipeline>,
}

impl std::fmt::Debug for FrameCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCompositor")
            .field("cache", &self.cache)
            .field("effects", &self.effects)
            .finish()
    }
}

impl FrameCompositor {
    pub fn new(cache: Arc<MediaAssetCache>, effects: Arc<EffectsPipeline>) -> Self {
        Self { cache, effects }
    }

    pub fn cache(&self) -> &Arc<MediaAssetCache> {
        &self.cache
    }

    pub fn effects(&self) -> &Arc<EffectsPipeline> {
        &self.effects
    }

    /// Compose the picture of `sequence_id` at `time`, at sequence resolution.
    ///
    /// Layers are painted bottom track first. A layer whose decode fails or
    /// misses the budget is drawn from that clip's last good frame in
    /// `scope`, or left out when there is none.
    pub async fn compose_video(
        &self,
        scope: &RenderScope,
        project: &Project,
        sequence_id: &str,
        time: f64,
        policy: FetchPolicy,
    ) -> CutlineResult<ComposedFrame> {
        let sequence = find_sequence(project, sequence_id)?;
        let frame_index = FrameClock::new(sequence.fps).frame_at(time);
        let deadline = policy.deadline();

        let layers: Vec<ActiveClip<'_>> = sequence
            .active_clips(time)
            .into_iter()
            .filter(|a| a.track.kind.is_visual() && a.clip.kind != ClipKind::Audio)
            .rev()
            .collect();

        // Adjustment clips have no picture of their own.
        let fetched = join_all(layers.iter().map(|layer| async move {
            if layer.track.kind == TrackKind::Fx {
                None
            } else {
                Some(self.fetch(scope, layer, deadline).await)
            }
        }))
        .await;

        let mut composed = ComposedFrame {
            frame: FrameBuffer::solid(sequence.width, sequence.height, BACKGROUND),
            time,
            fresh_layers: 0,
            stale_layers: 0,
            missing_layers: 0,
        };

        for (layer, source) in layers.iter().zip(fetched) {
            let clip = layer.clip;
            let opacity = clip.opacity.clamp(0.0, 1.0) * clip.transition_opacity(layer.local_time);

            let Some(source) = source else {
                let mut adjusted = composed.frame.clone();
                self.effects.apply_clip_effects(&mut adjusted, clip, frame_index);
                composed.frame.blit_over(&adjusted, 0, 0, opacity);
                continue;
            };
            let source = match source {
                Fetched::Fresh(frame) => {
                    composed.fresh_layers += 1;
                    frame
                }
                Fetched::Stale(frame) => {
                    composed.stale_layers += 1;
                    frame
                }
                Fetched::Missing => {
                    composed.missing_layers += 1;
                    continue;
                }
            };

            let mut picture = (*source).clone();
            self.effects.apply_clip_effects(&mut picture, clip, frame_index);
            let picture = picture.fit_into(sequence.width, sequence.height);
            composed.frame.blit_over(&picture, 0, 0, opacity);
        }

        Ok(composed)
    }

    async fn fetch(
        &self,
        scope: &RenderScope,
        layer: &ActiveClip<'_>,
        deadline: Option<Instant>,
    ) -> Fetched {
        let clip = layer.clip;
        let decode = self
            .cache
            .resolve_frame_for(scope.owner(), &clip.media_id, layer.source_time);
        match within(deadline, decode).await {
            Some(Ok(frame)) => {
                scope.remember(&clip.id, &frame);
                Fetched::Fresh(frame)
            }
            Some(Err(e)) => {
                tracing::warn!(clip_id = %clip.id, media_id = %clip.media_id, error = %e, "Frame decode failed");
                scope.stale_or_missing(&clip.id)
            }
            None => {
                tracing::trace!(clip_id = %clip.id, "Frame budget exceeded");
                scope.stale_or_missing(&clip.id)
            }
        }
    }

    /// Mix `duration` seconds of audio starting at sequence time `start`.
    ///
    /// Each clip contributes at `clip.volume * track.volume * master_volume`;
    /// muted tracks are skipped. Sources that fail to decode, or are still
    /// decoding when `policy` gives up, contribute silence. The result is
    /// stereo at the sequence sample rate, clamped to [-1, 1].
    #[allow(clippy::too_many_arguments)]
    pub async fn mix_audio(
        &self,
        scope: &RenderScope,
        project: &Project,
        sequence_id: &str,
        start: f64,
        duration: f64,
        master_volume: f32,
        policy: FetchPolicy,
    ) -> CutlineResult<AudioBuffer> {
        let sequence = find_sequence(project, sequence_id)?;
        let sample_rate = sequence.sample_rate;
        let frames = (duration.max(0.0) * sample_rate as f64).round() as usize;
        let mut mix = AudioBuffer::silence(sample_rate, MIX_CHANNELS, frames);
        if frames == 0 || sample_rate == 0 {
            return Ok(mix);
        }
        let deadline = policy.deadline();
        let rate = sample_rate as f64;
        let end = start + frames as f64 / rate;

        let mut spans = Vec::new();
        for track in sequence.tracks.iter().filter(|t| !t.muted) {
            for clip in track.clips.iter().filter(|c| c.start < end && c.end() > start) {
                let audible = project.asset(&clip.media_id).is_some_and(|a| a.has_audio());
                let gain = clip.volume * track.volume * master_volume;
                if !audible || gain == 0.0 {
                    continue;
                }

                let first = (((clip.start - start) * rate).ceil().max(0.0)) as usize;
                let last = (((clip.end() - start) * rate).ceil() as usize).min(frames);
                if first >= last {
                    continue;
                }
                let local_at = |i: usize| start + i as f64 / rate - clip.start;
                let source_times = source_times(clip, first, last, local_at);
                let src_lo = source_times.iter().copied().fold(f64::INFINITY, f64::min);
                let src_hi =
                    source_times.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 1.0 / rate;
                spans.push(MixSpan {
                    clip,
                    gain,
                    first,
                    source_times,
                    src_lo,
                    src_len: src_hi - src_lo,
                });
            }
        }

        let decoded = join_all(spans.iter().map(|span| {
            let decode = self.cache.resolve_audio_for(
                scope.owner(),
                &span.clip.media_id,
                span.src_lo,
                span.src_len,
                sample_rate,
            );
            within(deadline, decode)
        }))
        .await;

        for (span, source) in spans.iter().zip(decoded) {
            let source = match source {
                Some(Ok(source)) => source,
                Some(Err(e)) => {
                    tracing::warn!(clip_id = %span.clip.id, error = %e, "Audio decode failed");
                    continue;
                }
                None => {
                    tracing::trace!(clip_id = %span.clip.id, "Audio budget exceeded");
                    continue;
                }
            };

            for (offset, src_time) in span.source_times.iter().enumerate() {
                let src_frame = ((src_time - span.src_lo) * rate).floor() as usize;
                if src_frame >= source.frames() {
                    continue;
                }
                let out = (span.first + offset) * MIX_CHANNELS as usize;
                for ch in 0..MIX_CHANNELS {
                    mix.samples[out + ch as usize] += source.sample(src_frame, ch) * span.gain;
                }
            }
        }

        mix.clamp_peaks();
        Ok(mix)
    }
}

/// One clip's share of an audio mix.
struct MixSpan<'a> {
    clip: &'a Clip,
    gain: f32,
    /// First output sample frame the clip covers.
    first: usize,
    source_times: Vec<f64>,
    src_lo: f64,
    src_len: f64,
}

/// Await `work`, giving up at `deadline` when there is one.
async fn within<T>(deadline: Option<Instant>, work: impl Future<Output = T>) -> Option<T> {
    match deadline {
        None => Some(work.await),
        Some(deadline) => tokio::time::timeout_at(deadline, work).await.ok(),
    }
}

fn find_sequence<'a>(project: &'a Project, sequence_id: &str) -> CutlineResult<&'a Sequence> {
    project
        .sequence(sequence_id)
        .ok_or_else(|| CutlineError::validation(format!("sequence {sequence_id} does not exist")))
}

/// Source time for every output sample frame in `first..last`.
fn source_times(
    clip: &Clip,
    first: usize,
    last: usize,
    local_at: impl Fn(usize) -> f64,
) -> Vec<f64> {
    if clip.speed_curve.is_none() {
        return (first..last)
            .map(|i| clip.trim_start + local_at(i).max(0.0))
            .collect();
    }

    let mut times = Vec::with_capacity(last - first);
    let mut i = first;
    while i < last {
        let next = (i + SPEED_ANCHOR_STRIDE).min(last);
        let a = clip.source_time_at(local_at(i));
        let b = clip.source_time_at(local_at(next));
        let span = (next - i) as f64;
        for j in i..next {
            times.push(a + (b - a) * (j - i) as f64 / span);
        }
        i = next;
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_project_model::SpeedCurve;

    const RATE: f64 = 100.0;

    #[test]
    fn test_source_times_without_curve_follow_trim() {
        let clip = Clip::new("a", ClipKind::Audio, 2.0, 1.5, 4.0);
        let times = source_times(&clip, 0, 50, |i| i as f64 / RATE);
        assert_eq!(times.len(), 50);
        assert_eq!(times[0], 1.5);
        assert!((times[49] - 1.99).abs() < 1e-9);
    }

    #[test]
    fn test_source_times_follow_speed_curve() {
        let mut clip = Clip::new("a", ClipKind::Audio, 0.0, 0.0, 4.0);
        clip.speed_curve = Some(SpeedCurve::constant(2.0));
        let times = source_times(&clip, 0, 190, |i| i as f64 / RATE);
        for (i, t) in times.iter().enumerate().step_by(37) {
            let expected = 2.0 * i as f64 / RATE;
            assert!((t - expected).abs() < 0.01, "sample {i}: {t} vs {expected}");
        }
    }
}
