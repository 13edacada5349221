//! The encode collaborator contract and an in-memory encoder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cutline_common::{CutlineError, CutlineResult};
use cutline_project_model::{AudioBuffer, FrameBuffer};
use serde::{Deserialize, Serialize};

/// Container/codec combination of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    #[default]
    Mp4H264,
    Mp4H265,
    Webm,
    Gif,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 | ExportFormat::Mp4H265 => "mp4",
            ExportFormat::Webm => "webm",
            ExportFormat::Gif => "gif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 | ExportFormat::Mp4H265 => "video/mp4",
            ExportFormat::Webm => "video/webm",
            ExportFormat::Gif => "image/gif",
        }
    }

    /// Whether the container can carry an audio stream.
    pub fn supports_audio(&self) -> bool {
        !matches!(self, ExportFormat::Gif)
    }
}

/// Audio stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
}

/// Everything an encoder needs before the first frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: ExportFormat,
    pub video_bitrate_kbps: u32,
    /// `None` means the output has no audio stream at all.
    pub audio: Option<AudioSpec>,
    pub total_frames: u64,
}

/// A finished export.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBlob {
    pub data: Vec<u8>,
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub video_tracks: u32,
    pub audio_tracks: u32,
}

impl MediaBlob {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Turns composed frames and mixed audio into a container.
///
/// Calls arrive in order: `begin`, then interleaved `encode_video_frame` /
/// `encode_audio`, then `finish`. `abort` may be called at any point after
/// `begin` and must discard everything written so far.
#[async_trait]
pub trait MediaEncoder: Send {
    async fn begin(&mut self, spec: &EncodeSpec) -> CutlineResult<()>;

    async fn encode_video_frame(&mut self, frame: &FrameBuffer, index: u64) -> CutlineResult<()>;

    async fn encode_audio(&mut self, audio: &AudioBuffer) -> CutlineResult<()>;

    async fn finish(&mut self) -> CutlineResult<MediaBlob>;

    async fn abort(&mut self);
}

/// Counters shared between a [`MemoryEncoder`] and whoever inspects it.
#[derive(Debug, Default)]
pub struct EncoderProbe {
    pub frames: AtomicUsize,
    pub audio_chunks: AtomicUsize,
    pub aborts: AtomicUsize,
    pub finishes: AtomicUsize,
}

impl EncoderProbe {
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn audio_chunks(&self) -> usize {
        self.audio_chunks.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }
}

/// Keeps raw frames in memory. The blob holds the concatenated RGBA frames.
#[derive(Debug, Default)]
pub struct MemoryEncoder {
    spec: Option<EncodeSpec>,
    frames: Vec<FrameBuffer>,
    audio_samples: usize,
    fail_at_frame: Option<u64>,
    probe: Arc<EncoderProbe>,
}

impl MemoryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when asked to encode frame `index`.
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at_frame = Some(index);
        self
    }

    pub fn probe(&self) -> Arc<EncoderProbe> {
        Arc::clone(&self.probe)
    }

    pub fn frames(&self) -> &[FrameBuffer] {
        &self.frames
    }

    /// Interleaved samples received so far.
    pub fn audio_samples(&self) -> usize {
        self.audio_samples
    }
}

#[async_trait]
impl MediaEncoder for MemoryEncoder {
    async fn begin(&mut self, spec: &EncodeSpec) -> CutlineResult<()> {
        self.spec = Some(spec.clone());
        self.frames.clear();
        self.audio_samples = 0;
        Ok(())
    }

    async fn encode_video_frame(&mut self, frame: &FrameBuffer, index: u64) -> CutlineResult<()> {
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| CutlineError::export_failed("encoder not started"))?;
        if self.fail_at_frame == Some(index) {
            return Err(CutlineError::export_failed(format!("injected failure at frame {index}")));
        }
        if frame.width() != spec.width || frame.height() != spec.height {
            return Err(CutlineError::export_failed(format!(
                "frame {index} is {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                spec.width,
                spec.height
            )));
        }
        self.frames.push(frame.clone());
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn encode_audio(&mut self, audio: &AudioBuffer) -> CutlineResult<()> {
        match self.spec.as_ref().and_then(|s| s.audio) {
            Some(_) => {
                self.audio_samples += audio.samples.len();
                self.probe.audio_chunks.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(CutlineError::export_failed("audio sent to a video-only export")),
        }
    }

    async fn finish(&mut self) -> CutlineResult<MediaBlob> {
        let spec = self
            .spec
            .take()
            .ok_or_else(|| CutlineError::export_failed("encoder not started"))?;
        let data: Vec<u8> = self.frames.iter().flat_map(|f| f.data().iter().copied()).collect();
        self.probe.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(MediaBlob {
            data,
            format: spec.format,
            width: spec.width,
            height: spec.height,
            duration: spec.total_frames as f64 / spec.fps,
            video_tracks: 1,
            audio_tracks: u32::from(spec.audio.is_some()),
        })
    }

    async fn abort(&mut self) {
        self.spec = None;
        self.frames.clear();
        self.audio_samples = 0;
        self.probe.aborts.fetch_add(1, Ordering::SeqCst);
    }
}
