//! Decoder backed by the `ffmpeg` and `ffprobe` binaries.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use cutline_common::{CutlineError, CutlineResult};
use cutline_project_model::{AssetKind, AudioBuffer, FrameBuffer, MediaAssetMeta, Thumbnail};
use serde::Deserialize;
use tokio::process::Command;

use crate::decoder::{thumbnail_times, MediaDecoder, ProbeInfo};

/// Width of generated thumbnails; height follows the source aspect.
pub const THUMBNAIL_WIDTH: u32 = 160;

/// Decodes through short-lived ffmpeg subprocesses.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    thumbnail_dir: PathBuf,
}

impl FfmpegDecoder {
    pub fn new(thumbnail_dir: impl Into<PathBuf>) -> Self {
        Self {
            thumbnail_dir: thumbnail_dir.into(),
        }
    }

    /// Decoder writing thumbnails under the system temp directory.
    pub fn with_temp_thumbnails() -> Self {
        Self::new(std::env::temp_dir().join("cutline-thumbnails"))
    }

    /// Whether both `ffmpeg` and `ffprobe` are on `PATH`.
    pub fn is_available() -> bool {
        command_exists("ffmpeg") && command_exists("ffprobe")
    }

    async fn frame_size(&self, asset: &MediaAssetMeta) -> CutlineResult<(u32, u32)> {
        if let (Some(w), Some(h)) = (asset.width, asset.height) {
            if w > 0 && h > 0 {
                return Ok((w, h));
            }
        }
        let info = self.probe(asset).await?;
        match (info.width, info.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
            _ => Err(CutlineError::probe(format!(
                "no video dimensions for {}",
                asset.url
            ))),
        }
    }
}

#[async_trait]
impl MediaDecoder for FfmpegDecoder {
    async fn decode_frame(&self, asset: &MediaAssetMeta, time: f64) -> CutlineResult<FrameBuffer> {
        let path = source_path(asset)?;
        let (width, height) = self.frame_size(asset).await?;

        let mut args = vec!["-v".to_string(), "error".to_string()];
        if asset.kind != AssetKind::Image {
            args.push("-ss".to_string());
            args.push(format!("{:.6}", time.max(0.0)));
        }
        args.push("-i".to_string());
        args.push(path.display().to_string());
        args.extend(["-frames:v", "1", "-vf"].map(String::from));
        args.push(format!("scale={width}:{height}"));
        args.extend(["-f", "rawvideo", "-pix_fmt", "rgba", "-"].map(String::from));

        let data = run_ffmpeg(&args).await?;
        let expected = width as usize * height as usize * 4;
        if data.len() < expected {
            return Err(CutlineError::decode(format!(
                "short frame from {} at {time:.3}s ({} of {expected} bytes)",
                asset.url,
                data.len()
            )));
        }
        FrameBuffer::from_rgba(width, height, data[..expected].to_vec())
            .map_err(|e| CutlineError::decode(e.to_string()))
    }

    async fn decode_audio(
        &self,
        asset: &MediaAssetMeta,
        start: f64,
        duration: f64,
        sample_rate: u32,
    ) -> CutlineResult<AudioBuffer> {
        let path = source_path(asset)?;
        let args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-ss".into(),
            format!("{:.6}", start.max(0.0)),
            "-t".into(),
            format!("{:.6}", duration.max(0.0)),
            "-i".into(),
            path.display().to_string(),
            "-vn".into(),
            "-f".into(),
            "f32le".into(),
            "-ac".into(),
            "2".into(),
            "-ar".into(),
            sample_rate.to_string(),
            "-".into(),
        ];
        let data = run_ffmpeg(&args).await?;
        let samples = data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(AudioBuffer {
            sample_rate,
            channels: 2,
            samples,
        })
    }

    async fn thumbnails(&self, asset: &MediaAssetMeta, count: usize) -> CutlineResult<Vec<Thumbnail>> {
        let path = source_path(asset)?;
        let (src_w, src_h) = self.frame_size(asset).await?;
        let width = THUMBNAIL_WIDTH;
        let height = ((width as f64 * src_h as f64 / src_w as f64).round() as u32).max(2) & !1;

        let dir = self.thumbnail_dir.join(&asset.id);
        tokio::fs::create_dir_all(&dir).await?;

        let times = match asset.kind {
            AssetKind::Image => vec![0.0],
            _ => thumbnail_times(asset.duration, count),
        };
        let mut thumbs = Vec::with_capacity(times.len());
        for (i, time) in times.into_iter().enumerate() {
            let out = dir.join(format!("{i:03}.jpg"));
            let mut args = vec!["-v".to_string(), "error".to_string(), "-y".to_string()];
            if asset.kind != AssetKind::Image {
                args.push("-ss".to_string());
                args.push(format!("{time:.3}"));
            }
            args.extend([
                "-i".to_string(),
                path.display().to_string(),
                "-frames:v".to_string(),
                "1".to_string(),
                "-vf".to_string(),
                format!("scale={width}:{height}"),
                out.display().to_string(),
            ]);
            run_ffmpeg(&args).await?;
            thumbs.push(Thumbnail {
                time,
                width,
                height,
                uri: format!("file://{}", out.display()),
            });
        }
        tracing::debug!(asset_id = %asset.id, count = thumbs.len(), "Generated thumbnails");
        Ok(thumbs)
    }

    async fn probe(&self, asset: &MediaAssetMeta) -> CutlineResult<ProbeInfo> {
        let path = source_path(asset)?;
        let output = Command::new("ffprobe")
            .args(["-v", "error", "-show_streams", "-show_format", "-of", "json"])
            .arg(&path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CutlineError::probe(format!("Failed to start ffprobe: {e}")))?;
        if !output.status.success() {
            return Err(CutlineError::probe(format!(
                "ffprobe failed on {} (status {}): {}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| CutlineError::probe(format!("Unreadable ffprobe output: {e}")))?;
        Ok(parsed.into_info())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

impl FfprobeOutput {
    fn into_info(self) -> ProbeInfo {
        let video = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let audio = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        let duration = self
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .or_else(|| video.and_then(|v| v.duration.as_deref()))
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0);

        ProbeInfo {
            duration,
            width: video.and_then(|v| v.width).filter(|w| *w > 0),
            height: video.and_then(|v| v.height).filter(|h| *h > 0),
            fps: video.and_then(|v| {
                v.avg_frame_rate
                    .as_deref()
                    .and_then(parse_rate)
                    .or_else(|| v.r_frame_rate.as_deref().and_then(parse_rate))
            }),
            sample_rate: audio
                .and_then(|a| a.sample_rate.as_deref())
                .and_then(|r| r.parse().ok()),
        }
    }
}

/// Parse an ffprobe rational like `30000/1001`.
fn parse_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/').unwrap_or((raw, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    let rate = num / den;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn source_path(asset: &MediaAssetMeta) -> CutlineResult<PathBuf> {
    let path = asset
        .local_path()
        .ok_or_else(|| CutlineError::unsupported(format!("remote source {}", asset.url)))?;
    if !Path::new(&path).exists() {
        return Err(CutlineError::FileNotFound { path });
    }
    Ok(path)
}

async fn run_ffmpeg(args: &[String]) -> CutlineResult<Vec<u8>> {
    tracing::trace!(?args, "Running ffmpeg");
    let output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| CutlineError::decode(format!("Failed to start ffmpeg: {e}")))?;
    if !output.status.success() {
        return Err(CutlineError::decode(format!(
            "ffmpeg failed (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 1e-2);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
    }

    #[test]
    fn test_ffprobe_json_to_probe_info() {
        let raw = r#"{
            "streams": [
                {"codec_type": "audio", "sample_rate": "48000"},
                {"codec_type": "video", "width": 1280, "height": 720,
                 "avg_frame_rate": "0/0", "r_frame_rate": "24/1"}
            ],
            "format": {"duration": "12.500000"}
        }"#;
        let info = serde_json::from_str::<FfprobeOutput>(raw).unwrap().into_info();
        assert_eq!(info.width, Some(1280));
        assert_eq!(info.height, Some(720));
        assert_eq!(info.fps, Some(24.0));
        assert_eq!(info.sample_rate, Some(48_000));
        assert_eq!(info.duration, Some(12.5));
    }

    #[test]
    fn test_audio_only_probe_has_no_dimensions() {
        let raw = r#"{"streams": [{"codec_type": "audio", "sample_rate": "44100"}]}"#;
        let info = serde_json::from_str::<FfprobeOutput>(raw).unwrap().into_info();
        assert_eq!(info.width, None);
        assert_eq!(info.duration, None);
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let decoder = FfmpegDecoder::with_temp_thumbnails();
        let asset = MediaAssetMeta::new("gone", AssetKind::Video, "/nonexistent/cutline.mp4", 3.0);
        let err = decoder.probe(&asset).await.unwrap_err();
        assert!(matches!(err, CutlineError::FileNotFound { .. }));
    }
}
