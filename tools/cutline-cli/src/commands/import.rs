//! Import a media file into a project.

use std::path::{Path, PathBuf};

use cutline_common::EngineConfig;
use cutline_project_model::edit::{add_asset, insert_clip};
use cutline_project_model::{
    AssetKind, Clip, FsProjectStore, MediaAssetMeta, ProjectStore, TrackKind,
};

/// Timeline length given to still images.
const DEFAULT_STILL_SECS: f64 = 5.0;

/// Peaks stored for audio waveforms.
const WAVEFORM_BUCKETS: usize = 512;

pub async fn run(
    store: &FsProjectStore,
    config: &EngineConfig,
    id: &str,
    file: PathBuf,
    track: Option<String>,
    at: Option<f64>,
) -> anyhow::Result<()> {
    let file = file
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", file.display()))?;
    let project = super::load(store, id)?;
    let cache = super::media_cache(store, config, id)?;

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "media".to_string());
    let mut asset = MediaAssetMeta::new(name, asset_kind(&file), file.display().to_string(), 0.0);

    println!("Probing {}", file.display());
    let info = cache.decoder().probe(&asset).await?;
    asset.duration = info.duration.unwrap_or(0.0);
    asset.width = info.width;
    asset.height = info.height;
    asset.fps = info.fps;
    asset.sample_rate = info.sample_rate;
    if asset.kind != AssetKind::Image && asset.duration <= 0.0 {
        anyhow::bail!("{} reports no duration", file.display());
    }

    cache.register_asset(asset.clone());
    if asset.has_video() {
        cache
            .ensure_thumbnails(&asset.id, config.cache.thumbnails_per_asset)
            .await?;
    }
    if asset.has_audio() {
        cache.ensure_waveform(&asset.id, WAVEFORM_BUCKETS).await?;
    }
    let asset = cache.asset_meta(&asset.id).unwrap_or(asset);

    let project = add_asset(&project, asset.clone())?;
    let sequence = project
        .active_sequence()
        .ok_or_else(|| anyhow::anyhow!("Project has no active sequence"))?;
    let clip_kind = asset.clip_kind();
    let target = match track {
        Some(track_id) => sequence
            .track(&track_id)
            .ok_or_else(|| anyhow::anyhow!("Track {track_id} not found"))?,
        None => sequence
            .tracks
            .iter()
            .find(|t| !t.locked && t.kind != TrackKind::Fx && t.kind.accepts(clip_kind))
            .ok_or_else(|| anyhow::anyhow!("No track accepts {clip_kind:?} clips"))?,
    };

    let length = match asset.kind {
        AssetKind::Image => DEFAULT_STILL_SECS,
        _ => asset.duration,
    };
    let start = at.unwrap_or_else(|| target.end());
    let clip = Clip::new(&asset.id, clip_kind, start, 0.0, length);
    let track_name = target.name.clone();
    let track_id = target.id.clone();
    let project = insert_clip(&project, &track_id, clip)?;
    tracing::debug!(project_id = id, asset_id = %asset.id, track_id = %track_id, start, "Clip placed");

    store
        .save(Some(id), &project)
        .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))?;

    println!("Imported {} ({:?}, {:.2}s)", asset.name, asset.kind, asset.duration);
    if let (Some(w), Some(h)) = (asset.width, asset.height) {
        println!("  Size: {w}x{h}");
    }
    println!(
        "  Thumbnails: {}",
        asset.thumbnails.as_ref().map_or(0, Vec::len)
    );
    println!("  Placed on {track_name} at {start:.2}s");

    Ok(())
}

fn asset_kind(path: &Path) -> AssetKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "webp" | "bmp" | "tif" | "tiff" => AssetKind::Image,
        "wav" | "mp3" | "flac" | "ogg" | "oga" | "m4a" | "aac" | "opus" => AssetKind::Audio,
        _ => AssetKind::Video,
    }
}
