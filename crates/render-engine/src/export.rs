//! Export configuration and job management.
//!
//! An export walks the sequence frame by frame at the sequence frame rate,
//! composes each frame with the same [`FrameCompositor`] playback uses,
//! scales it to the output size, and hands it to a [`MediaEncoder`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cutline_common::{CutlineError, CutlineResult, ExportDefaults, FrameClock, RateLimiter};
use cutline_project_model::{FrameBuffer, Project, Sequence, SequenceId};
use serde::{Deserialize, Serialize};

use crate::compositor::{FetchPolicy, FrameCompositor, RenderScope, BACKGROUND, MIX_CHANNELS};
use crate::encoder::{AudioSpec, EncodeSpec, ExportFormat, MediaBlob, MediaEncoder};

/// Share of the progress bar covered by frame rendering; the rest is muxing.
const RENDER_SHARE: f64 = 0.95;

/// Output size, named by the length of the short side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ExportResolution {
    /// The sequence canvas size.
    #[default]
    Sequence,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
}

impl ExportResolution {
    pub fn short_side(&self) -> Option<u32> {
        match self {
            ExportResolution::Sequence => None,
            ExportResolution::P480 => Some(480),
            ExportResolution::P720 => Some(720),
            ExportResolution::P1080 => Some(1080),
            ExportResolution::P1440 => Some(1440),
            ExportResolution::P2160 => Some(2160),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ExportQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl ExportQuality {
    /// Video bits per pixel per frame.
    fn bits_per_pixel(&self) -> f64 {
        match self {
            ExportQuality::Low => 0.05,
            ExportQuality::Medium => 0.1,
            ExportQuality::High => 0.2,
        }
    }

    pub fn video_bitrate_kbps(&self, width: u32, height: u32, fps: f64) -> u32 {
        let bits = width as f64 * height as f64 * fps * self.bits_per_pixel();
        ((bits / 1000.0).round() as u32).max(500)
    }

    pub fn audio_bitrate_kbps(&self) -> u32 {
        match self {
            ExportQuality::Low => 96,
            ExportQuality::Medium => 128,
            ExportQuality::High => 192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AspectRatio {
    /// Keep the sequence aspect ratio.
    #[default]
    Sequence,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic,
}

impl AspectRatio {
    fn ratio(&self, sequence: &Sequence) -> f64 {
        match self {
            AspectRatio::Sequence if sequence.height > 0 => {
                sequence.width as f64 / sequence.height as f64
            }
            AspectRatio::Sequence => 16.0 / 9.0,
            AspectRatio::Landscape => 16.0 / 9.0,
            AspectRatio::Portrait => 9.0 / 16.0,
            AspectRatio::Square => 1.0,
            AspectRatio::Classic => 4.0 / 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub resolution: ExportResolution,
    pub quality: ExportQuality,
    pub format: ExportFormat,
    pub aspect_ratio: AspectRatio,
    pub include_audio: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            resolution: ExportResolution::default(),
            quality: ExportQuality::default(),
            format: ExportFormat::default(),
            aspect_ratio: AspectRatio::default(),
            include_audio: true,
        }
    }
}

impl ExportOptions {
    /// Output frame size for `sequence`, rounded to even dimensions.
    pub fn output_size(&self, sequence: &Sequence) -> (u32, u32) {
        if self.resolution == ExportResolution::Sequence && self.aspect_ratio == AspectRatio::Sequence
        {
            return (even(sequence.width), even(sequence.height));
        }
        let ratio = self.aspect_ratio.ratio(sequence);
        let short = self
            .resolution
            .short_side()
            .unwrap_or_else(|| sequence.width.min(sequence.height)) as f64;
        if ratio >= 1.0 {
            (even((short * ratio).round() as u32), even(short as u32))
        } else {
            (even(short as u32), even((short / ratio).round() as u32))
        }
    }
}

fn even(v: u32) -> u32 {
    (v.max(2)) & !1
}

/// An export job ready to be rendered.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Snapshot taken when the export started.
    pub project: Arc<Project>,
    pub sequence_id: SequenceId,
    pub options: ExportOptions,
    /// Checked between frames.
    pub cancel: Arc<AtomicBool>,
}

impl ExportJob {
    pub fn new(project: Arc<Project>, sequence_id: impl Into<SequenceId>, options: ExportOptions) -> Self {
        Self {
            project,
            sequence_id: sequence_id.into(),
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that cancels this job when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0], never decreasing within a job.
    pub fraction: f64,

    /// Human-readable status line.
    pub status: String,

    pub frames_rendered: u64,
    pub total_frames: u64,
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Cancelled,
    Failed,
}

struct ProgressReporter {
    callback: Option<ProgressCallback>,
    limiter: RateLimiter,
    fraction: f64,
    frames_rendered: u64,
    total_frames: u64,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressCallback>, defaults: &ExportDefaults, total_frames: u64) -> Self {
        Self {
            callback,
            limiter: RateLimiter::new(
                Duration::from_millis(defaults.progress_interval_ms),
                Duration::from_millis(defaults.heartbeat_ms),
            ),
            fraction: 0.0,
            frames_rendered: 0,
            total_frames,
        }
    }

    fn emit(&self, stage: ExportStage, status: String) {
        if let Some(cb) = &self.callback {
            cb(ExportProgress {
                fraction: self.fraction,
                status,
                frames_rendered: self.frames_rendered,
                total_frames: self.total_frames,
                stage,
            });
        }
    }

    /// Report unconditionally.
    fn force(&mut self, stage: ExportStage, fraction: f64, status: impl Into<String>) {
        self.fraction = self.fraction.max(fraction.clamp(0.0, 1.0));
        self.limiter.mark(Instant::now());
        self.emit(stage, status.into());
    }

    fn frame_done(&mut self) {
        self.frames_rendered += 1;
        let fraction = RENDER_SHARE * self.frames_rendered as f64 / self.total_frames.max(1) as f64;
        self.fraction = self.fraction.max(fraction);
        if self.limiter.should_emit(Instant::now()) {
            self.emit(ExportStage::Rendering, self.rendering_status());
        }
    }

    /// Report the unchanged fraction if nothing was reported for too long.
    fn heartbeat(&mut self) {
        let now = Instant::now();
        if self.limiter.is_overdue(now) {
            self.limiter.mark(now);
            self.emit(ExportStage::Rendering, self.rendering_status());
        }
    }

    fn rendering_status(&self) -> String {
        format!("Rendering frame {} of {}", self.frames_rendered, self.total_frames)
    }
}

/// Export a sequence of the job's project through `encoder`.
///
/// On cancellation the encoder is aborted and `ExportCancelled` is returned.
/// Any other failure aborts the encoder and returns a single `ExportFailed`;
/// partial output is never returned.
pub async fn export_project(
    job: ExportJob,
    compositor: &FrameCompositor,
    encoder: &mut dyn MediaEncoder,
    progress: Option<ProgressCallback>,
    defaults: &ExportDefaults,
) -> CutlineResult<MediaBlob> {
    let sequence = job.project.sequence(&job.sequence_id).ok_or_else(|| {
        CutlineError::export_failed(format!("sequence {} does not exist", job.sequence_id))
    })?;
    let clock = FrameClock::new(sequence.fps);
    let total_frames = clock.frame_count(sequence.duration);
    let mut reporter = ProgressReporter::new(progress, defaults, total_frames);

    tracing::info!(
        sequence_id = %job.sequence_id,
        format = ?job.options.format,
        total_frames,
        "Starting export"
    );
    reporter.force(ExportStage::Preparing, 0.0, "Preparing");

    if total_frames == 0 {
        reporter.force(ExportStage::Failed, 0.0, "Nothing to export");
        return Err(CutlineError::export_failed("sequence is empty"));
    }

    let (width, height) = job.options.output_size(sequence);
    let audio = (job.options.include_audio && job.options.format.supports_audio()).then(|| {
        AudioSpec {
            sample_rate: sequence.sample_rate,
            channels: MIX_CHANNELS,
            bitrate_kbps: job.options.quality.audio_bitrate_kbps(),
        }
    });
    let spec = EncodeSpec {
        width,
        height,
        fps: clock.fps(),
        format: job.options.format,
        video_bitrate_kbps: job.options.quality.video_bitrate_kbps(width, height, clock.fps()),
        audio,
        total_frames,
    };

    if let Err(e) = encoder.begin(&spec).await {
        return Err(fail(encoder, &mut reporter, "starting encoder", e).await);
    }

    let scope = RenderScope::new();
    let start = Instant::now();
    for index in 0..total_frames {
        if job.cancel.load(Ordering::SeqCst) {
            encoder.abort().await;
            reporter.force(ExportStage::Cancelled, reporter.fraction, "Cancelled");
            tracing::info!(frame = index, "Export cancelled");
            return Err(CutlineError::ExportCancelled);
        }

        let step = render_frame(&job, &clock, &spec, index, compositor, &scope, encoder);
        let rendered = with_heartbeat(step, &mut reporter).await;
        if let Err(e) = rendered {
            return Err(fail(encoder, &mut reporter, &format!("frame {index}"), e).await);
        }
        reporter.frame_done();
    }

    reporter.force(ExportStage::Finalizing, RENDER_SHARE, "Finalizing");
    let finished = with_heartbeat(encoder.finish(), &mut reporter).await;
    let blob = match finished {
        Ok(blob) => blob,
        Err(e) => return Err(fail(encoder, &mut reporter, "finalizing", e).await),
    };

    reporter.force(ExportStage::Complete, 1.0, "Complete");
    tracing::info!(
        frames = total_frames,
        bytes = blob.data.len(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Export complete"
    );
    Ok(blob)
}

/// Compose, mix and encode frame `index`.
async fn render_frame(
    job: &ExportJob,
    clock: &FrameClock,
    spec: &EncodeSpec,
    index: u64,
    compositor: &FrameCompositor,
    scope: &RenderScope,
    encoder: &mut dyn MediaEncoder,
) -> CutlineResult<()> {
    let time = clock.time_of(index);
    let composed = compositor
        .compose_video(scope, &job.project, &job.sequence_id, time, FetchPolicy::Wait)
        .await?;
    let frame = scale_to_output(composed.frame, spec.width, spec.height);
    encoder.encode_video_frame(&frame, index).await?;

    if let Some(audio) = spec.audio {
        let rate = audio.sample_rate as f64;
        let from = (time * rate).round();
        let to = (clock.time_of(index + 1) * rate).round();
        let mixed = compositor
            .mix_audio(
                scope,
                &job.project,
                &job.sequence_id,
                from / rate,
                (to - from) / rate,
                1.0,
                FetchPolicy::Wait,
            )
            .await?;
        encoder.encode_audio(&mixed).await?;
    }
    Ok(())
}

/// Letterbox a composed frame onto an opaque output canvas.
pub fn scale_to_output(frame: FrameBuffer, width: u32, height: u32) -> FrameBuffer {
    if frame.width() == width && frame.height() == height {
        return frame;
    }
    let mut out = FrameBuffer::solid(width, height, BACKGROUND);
    out.blit_over(&frame.fit_into(width, height), 0, 0, 1.0);
    out
}

/// Drive `work`, reporting whenever the reporter has been silent for its
/// maximum silence, counted from the last report of any kind.
async fn with_heartbeat<T>(
    work: impl Future<Output = CutlineResult<T>>,
    reporter: &mut ProgressReporter,
) -> CutlineResult<T> {
    tokio::pin!(work);
    loop {
        let floor = Instant::now() + Duration::from_millis(1);
        let due = reporter.limiter.next_due().map_or(floor, |due| due.max(floor));
        tokio::select! {
            result = &mut work => return result,
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(due)) => reporter.heartbeat(),
        }
    }
}

async fn fail(
    encoder: &mut dyn MediaEncoder,
    reporter: &mut ProgressReporter,
    during: &str,
    error: CutlineError,
) -> CutlineError {
    encoder.abort().await;
    tracing::error!(during, error = %error, "Export failed");
    let message = format!("{during}: {error}");
    reporter.force(ExportStage::Failed, reporter.fraction, message.clone());
    match error {
        CutlineError::ExportFailed { .. } => error,
        _ => CutlineError::export_failed(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(width: u32, height: u32) -> Sequence {
        Sequence::new("s", width, height, 30.0)
    }

    #[test]
    fn test_output_size_defaults_to_sequence() {
        let options = ExportOptions::default();
        assert_eq!(options.output_size(&sequence(1920, 1080)), (1920, 1080));
        assert_eq!(options.output_size(&sequence(641, 361)), (640, 360));
    }

    #[test]
    fn test_output_size_from_resolution_and_aspect() {
        let mut options = ExportOptions {
            resolution: ExportResolution::P720,
            ..ExportOptions::default()
        };
        assert_eq!(options.output_size(&sequence(1920, 1080)), (1280, 720));

        options.aspect_ratio = AspectRatio::Portrait;
        assert_eq!(options.output_size(&sequence(1920, 1080)), (720, 1280));

        options.aspect_ratio = AspectRatio::Square;
        options.resolution = ExportResolution::Sequence;
        assert_eq!(options.output_size(&sequence(1920, 1080)), (1080, 1080));
    }

    #[test]
    fn test_bitrate_scales_with_quality() {
        let low = ExportQuality::Low.video_bitrate_kbps(1920, 1080, 30.0);
        let high = ExportQuality::High.video_bitrate_kbps(1920, 1080, 30.0);
        assert!(high > low);
        assert_eq!(ExportQuality::Low.video_bitrate_kbps(16, 16, 1.0), 500);
    }

    #[test]
    fn test_options_wire_format() {
        let options: ExportOptions = serde_json::from_str(
            r#"{"resolution":"720p","quality":"high","format":"webm","aspectRatio":"9:16","includeAudio":false}"#,
        )
        .unwrap();
        assert_eq!(options.resolution, ExportResolution::P720);
        assert_eq!(options.format, ExportFormat::Webm);
        assert_eq!(options.aspect_ratio, AspectRatio::Portrait);
        assert!(!options.include_audio);

        let defaults: ExportOptions = serde_json::from_str("{}").unwrap();
        assert!(defaults.include_audio);
    }

    #[test]
    fn test_scale_to_output_letterboxes_opaque() {
        let frame = FrameBuffer::solid(4, 4, [200, 10, 10, 255]);
        let out = scale_to_output(frame, 8, 4);
        assert_eq!(out.pixel(0, 0), BACKGROUND);
        assert_eq!(out.pixel(4, 2), [200, 10, 10, 255]);
    }
}
