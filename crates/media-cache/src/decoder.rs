//! The decode collaborator contract.

use async_trait::async_trait;
use cutline_common::CutlineResult;
use cutline_project_model::{AudioBuffer, FrameBuffer, MediaAssetMeta, Thumbnail};

/// Stream metadata discovered by probing a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub sample_rate: Option<u32>,
}

/// Opens sources and streams decoded buffers out of them.
///
/// Implementations are shared across spawned jobs, so they must be cheap to
/// call concurrently.
#[async_trait]
pub trait MediaDecoder: Send + Sync {
    /// Decode the video frame showing at `time` seconds into the source.
    async fn decode_frame(&self, asset: &MediaAssetMeta, time: f64) -> CutlineResult<FrameBuffer>;

    /// Decode `duration` seconds of audio from `start`, resampled to
    /// `sample_rate`, interleaved stereo.
    async fn decode_audio(
        &self,
        asset: &MediaAssetMeta,
        start: f64,
        duration: f64,
        sample_rate: u32,
    ) -> CutlineResult<AudioBuffer>;

    /// Generate `count` evenly spaced thumbnails.
    async fn thumbnails(&self, asset: &MediaAssetMeta, count: usize) -> CutlineResult<Vec<Thumbnail>>;

    async fn probe(&self, asset: &MediaAssetMeta) -> CutlineResult<ProbeInfo>;

    /// Peak envelope of the whole source in `buckets` buckets.
    async fn waveform(&self, asset: &MediaAssetMeta, buckets: usize) -> CutlineResult<Vec<f32>> {
        let audio = self
            .decode_audio(asset, 0.0, asset.duration, WAVEFORM_SAMPLE_RATE)
            .await?;
        Ok(waveform_from_audio(&audio, buckets))
    }
}

/// Sample rate used when decoding audio only to draw a waveform.
pub const WAVEFORM_SAMPLE_RATE: u32 = 8_000;

/// Evenly spaced sample instants for `count` thumbnails over `duration`.
///
/// Each thumbnail sits in the middle of its slice so none lands exactly on
/// the last (often black) frame.
pub fn thumbnail_times(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !duration.is_finite() || duration <= 0.0 {
        return if count > 0 { vec![0.0] } else { vec![] };
    }
    let slice = duration / count as f64;
    (0..count).map(|i| slice * (i as f64 + 0.5)).collect()
}

/// Reduce audio to a peak envelope in `[0, 1]`.
pub fn waveform_from_audio(audio: &AudioBuffer, buckets: usize) -> Vec<f32> {
    let frames = audio.frames();
    if buckets == 0 || frames == 0 {
        return vec![0.0; buckets];
    }
    let channels = audio.channels.max(1);
    (0..buckets)
        .map(|b| {
            let lo = b * frames / buckets;
            let hi = ((b + 1) * frames / buckets).max(lo + 1).min(frames);
            let mut peak = 0.0f32;
            for frame in lo..hi {
                for ch in 0..channels {
                    peak = peak.max(audio.sample(frame, ch).abs());
                }
            }
            peak.min(1.0)
        })
        .collect()
}
