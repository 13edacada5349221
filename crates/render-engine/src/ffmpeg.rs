//! Encoder backed by the `ffmpeg` binary.
//!
//! Frames and audio are spooled as raw RGBA and `f32le` to a scratch
//! directory, then muxed in one ffmpeg run at `finish()`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use cutline_common::{CutlineError, CutlineResult};
use cutline_media_cache::command_exists;
use cutline_project_model::{AudioBuffer, FrameBuffer};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::Command;

use crate::encoder::{EncodeSpec, ExportFormat, MediaBlob, MediaEncoder};

struct Spool {
    spec: EncodeSpec,
    dir: PathBuf,
    video: BufWriter<File>,
    audio: Option<BufWriter<File>>,
    frames: u64,
}

/// Spools to temporary files and muxes with ffmpeg.
pub struct FfmpegEncoder {
    scratch_root: PathBuf,
    spool: Option<Spool>,
}

impl std::fmt::Debug for FfmpegEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEncoder")
            .field("scratch_root", &self.scratch_root)
            .field("active", &self.spool.is_some())
            .finish()
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl FfmpegEncoder {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            spool: None,
        }
    }

    pub fn is_available() -> bool {
        command_exists("ffmpeg")
    }

    fn spool(&mut self) -> CutlineResult<&mut Spool> {
        self.spool
            .as_mut()
            .ok_or_else(|| CutlineError::export_failed("encoder not started"))
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn begin(&mut self, spec: &EncodeSpec) -> CutlineResult<()> {
        if !Self::is_available() {
            return Err(CutlineError::unsupported(
                "No supported encoder found (expected ffmpeg in PATH)",
            ));
        }
        self.abort().await;

        let dir = self
            .scratch_root
            .join(format!("cutline-export-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        let video = BufWriter::new(File::create(dir.join("video.rgba")).await?);
        let audio = match spec.audio {
            Some(_) => Some(BufWriter::new(File::create(dir.join("audio.f32")).await?)),
            None => None,
        };
        tracing::debug!(dir = %dir.display(), "Export spool created");
        self.spool = Some(Spool {
            spec: spec.clone(),
            dir,
            video,
            audio,
            frames: 0,
        });
        Ok(())
    }

    async fn encode_video_frame(&mut self, frame: &FrameBuffer, index: u64) -> CutlineResult<()> {
        let spool = self.spool()?;
        if frame.width() != spool.spec.width || frame.height() != spool.spec.height {
            return Err(CutlineError::export_failed(format!(
                "frame {index} is {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                spool.spec.width,
                spool.spec.height
            )));
        }
        spool.video.write_all(frame.data()).await?;
        spool.frames += 1;
        Ok(())
    }

    async fn encode_audio(&mut self, audio: &AudioBuffer) -> CutlineResult<()> {
        let spool = self.spool()?;
        let Some(writer) = spool.audio.as_mut() else {
            return Err(CutlineError::export_failed("audio sent to a video-only export"));
        };
        let bytes: Vec<u8> = audio.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        writer.write_all(&bytes).await?;
        Ok(())
    }

    async fn finish(&mut self) -> CutlineResult<MediaBlob> {
        let mut spool = self
            .spool
            .take()
            .ok_or_else(|| CutlineError::export_failed("encoder not started"))?;
        let result = mux(&mut spool).await;
        remove_dir(&spool.dir).await;
        result
    }

    async fn abort(&mut self) {
        if let Some(spool) = self.spool.take() {
            drop(spool.video);
            drop(spool.audio);
            remove_dir(&spool.dir).await;
            tracing::debug!(dir = %spool.dir.display(), "Export spool discarded");
        }
    }
}

async fn mux(spool: &mut Spool) -> CutlineResult<MediaBlob> {
    spool.video.flush().await?;
    if let Some(audio) = spool.audio.as_mut() {
        audio.flush().await?;
    }

    let spec = &spool.spec;
    let output = spool.dir.join(format!("output.{}", spec.format.extension()));
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{}x{}", spec.width, spec.height),
        "-r".into(),
        format!("{}", spec.fps),
        "-i".into(),
        spool.dir.join("video.rgba").display().to_string(),
    ];
    if let Some(audio) = spec.audio {
        args.extend([
            "-f".into(),
            "f32le".into(),
            "-ar".into(),
            audio.sample_rate.to_string(),
            "-ac".into(),
            audio.channels.to_string(),
            "-i".into(),
            spool.dir.join("audio.f32").display().to_string(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "1:a".into(),
        ]);
    } else {
        args.push("-an".into());
    }
    args.extend(codec_args(spec));
    args.push(output.display().to_string());

    tracing::debug!(?args, "Running ffmpeg");
    let run = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CutlineError::export_failed(format!("Failed to start ffmpeg: {e}")))?;
    if !run.status.success() {
        return Err(CutlineError::export_failed(format!(
            "ffmpeg export failed (status {}): {}",
            run.status,
            String::from_utf8_lossy(&run.stderr).trim()
        )));
    }

    let data = tokio::fs::read(&output).await?;
    Ok(MediaBlob {
        data,
        format: spec.format,
        width: spec.width,
        height: spec.height,
        duration: spool.frames as f64 / spec.fps,
        video_tracks: 1,
        audio_tracks: u32::from(spec.audio.is_some()),
    })
}

/// Codec arguments per output format. Audio arguments are left out for
/// video-only exports.
fn codec_args(spec: &EncodeSpec) -> Vec<String> {
    let video_bitrate = format!("{}k", spec.video_bitrate_kbps.max(500));
    let audio_bitrate = format!("{}k", spec.audio.map_or(128, |a| a.bitrate_kbps.max(64)));

    let (video, audio): (Vec<&str>, Vec<&str>) = match spec.format {
        ExportFormat::Mp4H264 => (
            vec!["-c:v", "libx264", "-preset", "medium", "-profile:v", "high", "-pix_fmt", "yuv420p", "-b:v"],
            vec!["-c:a", "aac", "-b:a"],
        ),
        ExportFormat::Mp4H265 => (
            vec!["-c:v", "libx265", "-preset", "medium", "-pix_fmt", "yuv420p", "-b:v"],
            vec!["-c:a", "aac", "-b:a"],
        ),
        ExportFormat::Webm => (
            vec!["-c:v", "libvpx-vp9", "-b:v"],
            vec!["-c:a", "libopus", "-b:a"],
        ),
        ExportFormat::Gif => {
            return vec![
                "-vf".to_string(),
                "fps=15,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse".to_string(),
            ];
        }
    };

    let mut args: Vec<String> = video.into_iter().map(String::from).collect();
    args.push(video_bitrate);
    if spec.audio.is_some() {
        args.extend(audio.into_iter().map(String::from));
        args.push(audio_bitrate);
    }
    if matches!(spec.format, ExportFormat::Mp4H264 | ExportFormat::Mp4H265) {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }
    args
}

async fn remove_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove export spool");
    }
}
