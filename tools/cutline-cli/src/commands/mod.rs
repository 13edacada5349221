pub mod check;
pub mod export;
pub mod import;
pub mod info;
pub mod init;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use cutline_common::EngineConfig;
use cutline_media_cache::{FfmpegDecoder, MediaAssetCache};
use cutline_project_model::{FsProjectStore, Project, ProjectStore};

pub fn open_store(root: Option<PathBuf>, config: &EngineConfig) -> FsProjectStore {
    let root = root.unwrap_or_else(|| config.projects_dir.clone());
    FsProjectStore::new(root).with_retention(config.history.max_entries)
}

pub fn load(store: &FsProjectStore, id: &str) -> anyhow::Result<Project> {
    store
        .load(id)
        .map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))
}

/// Asset cache over ffmpeg, writing thumbnails next to the project unless
/// the config names a thumbnail directory.
pub fn media_cache(
    store: &FsProjectStore,
    config: &EngineConfig,
    id: &str,
) -> anyhow::Result<Arc<MediaAssetCache>> {
    if !FfmpegDecoder::is_available() {
        anyhow::bail!("ffmpeg and ffprobe are required (see `cutline check`)");
    }
    let thumbnail_dir = config
        .cache
        .thumbnail_dir
        .clone()
        .unwrap_or_else(|| store.project_dir(id).join("cache").join("thumbnails"));
    let decoder = Arc::new(FfmpegDecoder::new(thumbnail_dir));
    Ok(Arc::new(MediaAssetCache::new(decoder, &config.cache)))
}
