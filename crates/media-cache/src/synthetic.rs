//! Deterministic in-process decoder for tests, demos, and headless checks.
//!
//! Every video frame is a solid color derived from the asset id and the
//! source frame index, and audio is a constant level per asset, so callers can
//! predict exactly what a composition of synthetic sources should look and
//! sound like.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cutline_common::{CutlineError, CutlineResult, FrameClock};
use cutline_project_model::{AssetKind, AudioBuffer, FrameBuffer, MediaAssetMeta, Thumbnail};

use crate::cache::DEFAULT_SOURCE_FPS;
use crate::decoder::{thumbnail_times, MediaDecoder, ProbeInfo};

/// Frame size used when neither the asset nor the decoder knows one.
pub const SYNTHETIC_SIZE: (u32, u32) = (64, 36);

/// Request kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticRequest {
    Frame,
    Audio,
    Thumbnails,
    Probe,
}

#[derive(Debug, Default)]
pub struct CallCounts {
    frames: AtomicUsize,
    audio: AtomicUsize,
    thumbnails: AtomicUsize,
    probes: AtomicUsize,
}

/// Decoder producing predictable buffers without touching the filesystem.
#[derive(Debug)]
pub struct SyntheticDecoder {
    latency: Duration,
    probe_size: (u32, u32),
    audio_level: f32,
    failing: Mutex<HashSet<SyntheticRequest>>,
    calls: CallCounts,
}

impl Default for SyntheticDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticDecoder {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            probe_size: (640, 360),
            audio_level: 0.25,
            failing: Mutex::new(HashSet::new()),
            calls: CallCounts::default(),
        }
    }

    /// Delay every request by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Dimensions reported by `probe`.
    pub fn with_probe_size(mut self, width: u32, height: u32) -> Self {
        self.probe_size = (width, height);
        self
    }

    /// Sample value of every decoded audio sample.
    pub fn with_audio_level(mut self, level: f32) -> Self {
        self.audio_level = level;
        self
    }

    /// Make requests of `kind` fail (or succeed again).
    pub fn set_failing(&self, kind: SyntheticRequest, failing: bool) {
        let mut set = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }

    pub fn frame_decodes(&self) -> usize {
        self.calls.frames.load(Ordering::SeqCst)
    }

    pub fn audio_decodes(&self) -> usize {
        self.calls.audio.load(Ordering::SeqCst)
    }

    pub fn thumbnail_calls(&self) -> usize {
        self.calls.thumbnails.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.calls.probes.load(Ordering::SeqCst)
    }

    pub fn audio_level(&self) -> f32 {
        self.audio_level
    }

    async fn enter(&self, kind: SyntheticRequest, counter: &AtomicUsize) -> CutlineResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind);
        if failing {
            let message = format!("injected {kind:?} failure");
            return Err(match kind {
                SyntheticRequest::Probe => CutlineError::probe(message),
                _ => CutlineError::decode(message),
            });
        }
        Ok(())
    }

    fn frame_size(&self, asset: &MediaAssetMeta) -> (u32, u32) {
        match (asset.width, asset.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => SYNTHETIC_SIZE,
        }
    }
}

/// Color of every pixel of `asset_id`'s frame at source frame `frame`.
pub fn pattern_color(asset_id: &str, frame: u64) -> [u8; 4] {
    let hash = fnv1a(asset_id.as_bytes());
    [
        (hash & 0xFF) as u8,
        ((hash >> 8) & 0xFF) as u8,
        (frame % 256) as u8,
        255,
    ]
}

/// Source frame index the synthetic decoder shows at `time`.
pub fn pattern_frame(asset: &MediaAssetMeta, time: f64) -> u64 {
    if asset.kind == AssetKind::Image {
        return 0;
    }
    FrameClock::new(asset.fps.unwrap_or(DEFAULT_SOURCE_FPS)).frame_at(time.max(0.0))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl MediaDecoder for SyntheticDecoder {
    async fn decode_frame(&self, asset: &MediaAssetMeta, time: f64) -> CutlineResult<FrameBuffer> {
        self.enter(SyntheticRequest::Frame, &self.calls.frames).await?;
        let (w, h) = self.frame_size(asset);
        Ok(FrameBuffer::solid(
            w,
            h,
            pattern_color(&asset.id, pattern_frame(asset, time)),
        ))
    }

    async fn decode_audio(
        &self,
        asset: &MediaAssetMeta,
        start: f64,
        duration: f64,
        sample_rate: u32,
    ) -> CutlineResult<AudioBuffer> {
        self.enter(SyntheticRequest::Audio, &self.calls.audio).await?;
        let available = (asset.duration - start).max(0.0);
        let frames = (duration.min(available) * sample_rate as f64).round() as usize;
        let mut audio = AudioBuffer::silence(sample_rate, 2, frames);
        audio.samples.fill(self.audio_level);
        Ok(audio)
    }

    async fn thumbnails(&self, asset: &MediaAssetMeta, count: usize) -> CutlineResult<Vec<Thumbnail>> {
        self.enter(SyntheticRequest::Thumbnails, &self.calls.thumbnails)
            .await?;
        let (w, h) = self.frame_size(asset);
        Ok(thumbnail_times(asset.duration, count)
            .into_iter()
            .enumerate()
            .map(|(i, time)| Thumbnail {
                time,
                width: w,
                height: h,
                uri: format!("synthetic://{}/{i}", asset.id),
            })
            .collect())
    }

    async fn probe(&self, asset: &MediaAssetMeta) -> CutlineResult<ProbeInfo> {
        self.enter(SyntheticRequest::Probe, &self.calls.probes).await?;
        let visual = asset.kind != AssetKind::Audio;
        Ok(ProbeInfo {
            duration: (asset.kind != AssetKind::Image).then_some(asset.duration),
            width: visual.then_some(self.probe_size.0),
            height: visual.then_some(self.probe_size.1),
            fps: (asset.kind == AssetKind::Video).then_some(DEFAULT_SOURCE_FPS),
            sample_rate: (asset.kind != AssetKind::Image).then_some(48_000),
        })
    }
}
