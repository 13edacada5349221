//! Export a project to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use cutline_common::{CutlineError, EngineConfig};
use cutline_processing_core::EffectsPipeline;
use cutline_project_model::FsProjectStore;
use cutline_render_engine::{
    export_project, ExportJob, ExportOptions, ExportProgress, FfmpegEncoder, FrameCompositor,
    ProgressCallback,
};
use serde::de::DeserializeOwned;

pub fn parse_options(
    format: &str,
    resolution: &str,
    quality: &str,
    aspect: &str,
    include_audio: bool,
) -> anyhow::Result<ExportOptions> {
    Ok(ExportOptions {
        format: parse_choice("format", format, "mp4-h264, mp4-h265, webm, gif")?,
        resolution: parse_choice(
            "resolution",
            resolution,
            "sequence, 480p, 720p, 1080p, 1440p, 2160p",
        )?,
        quality: parse_choice("quality", quality, "low, medium, high")?,
        aspect_ratio: parse_choice("aspect", aspect, "sequence, 16:9, 9:16, 1:1, 4:3")?,
        include_audio,
    })
}

/// Parse a flag through the option's wire name.
fn parse_choice<T: DeserializeOwned>(flag: &str, value: &str, allowed: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| anyhow::anyhow!("Unknown {flag}: {value}. Use: {allowed}"))
}

pub async fn run(
    store: &FsProjectStore,
    config: &EngineConfig,
    id: &str,
    output: Option<PathBuf>,
    options: ExportOptions,
) -> anyhow::Result<()> {
    if !FfmpegEncoder::is_available() {
        anyhow::bail!("ffmpeg is required for export (see `cutline check`)");
    }
    let project = super::load(store, id)?;
    let sequence = project
        .active_sequence()
        .ok_or_else(|| anyhow::anyhow!("Project has no active sequence"))?;
    let sequence_id = sequence.id.clone();
    let (width, height) = options.output_size(sequence);

    let output_path = output.unwrap_or_else(|| {
        store
            .project_dir(id)
            .join("exports")
            .join(format!("{}.{}", sequence.name, options.format.extension()))
    });

    println!("Exporting {} / {}", project.name, sequence.name);
    println!("  Output: {}", output_path.display());
    println!("  Format: {:?}", options.format);
    println!("  Resolution: {width}x{height} @ {}fps", sequence.fps);

    let cache = super::media_cache(store, config, id)?;
    cache.register_project(&project);
    let compositor = FrameCompositor::new(cache, Arc::new(EffectsPipeline::new()));

    let job = ExportJob::new(Arc::new(project), sequence_id, options);
    let cancel = job.cancel_flag();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:.1}% ({}/{} frames) {}    ",
            p.fraction * 100.0,
            p.frames_rendered,
            p.total_frames,
            p.status,
        );
        std::io::stdout().flush().ok();
    });

    let mut encoder = FfmpegEncoder::default();
    let result = export_project(
        job,
        &compositor,
        &mut encoder,
        Some(progress_cb),
        &config.export,
    )
    .await;
    ctrl_c.abort();
    tracing::debug!(project_id = id, ok = result.is_ok(), "Export finished");
    println!();

    match result {
        Ok(blob) => {
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output_path, &blob.data)?;
            println!(
                "Export complete: {} ({} bytes, {:.2}s)",
                output_path.display(),
                blob.data.len(),
                blob.duration
            );
            Ok(())
        }
        Err(CutlineError::ExportCancelled) => {
            println!("Export cancelled.");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Export failed: {e}")),
    }
}
