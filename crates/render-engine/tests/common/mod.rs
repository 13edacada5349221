//! Shared fixture: a small two-second sequence over synthetic media.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cutline_media_cache::{MediaAssetCache, SyntheticDecoder};
use cutline_processing_core::EffectsPipeline;
use cutline_project_model::{
    AssetKind, Clip, ClipKind, MediaAssetMeta, Project, Track, TrackKind,
};
use cutline_render_engine::FrameCompositor;

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 36;
pub const FPS: f64 = 10.0;
pub const SAMPLE_RATE: u32 = 1000;

/// Tracks, top to bottom: overlay (still at half opacity over [1, 2)),
/// video (`bg` over [0, 2)), audio (`music` at half volume over [1, 2)).
pub fn project() -> Project {
    let mut project = Project::new("Fixture");

    let mut bg = MediaAssetMeta::new("bg", AssetKind::Video, "bg.mp4", 10.0).with_id("bg");
    bg.fps = Some(FPS);
    let still = MediaAssetMeta::new("still", AssetKind::Image, "still.png", 0.0).with_id("still");
    let music = MediaAssetMeta::new("music", AssetKind::Audio, "music.wav", 4.0).with_id("music");
    for asset in [bg, still, music] {
        project.media_assets.insert(asset.id.clone(), asset);
    }

    let mut overlay = Track::new(TrackKind::Overlay).named("Titles");
    let mut still_clip = Clip::new("still", ClipKind::Image, 1.0, 0.0, 1.0).with_id("still-clip");
    still_clip.opacity = 0.5;
    overlay.clips.push(still_clip);

    let mut video = Track::new(TrackKind::Video).named("V1");
    video
        .clips
        .push(Clip::new("bg", ClipKind::Video, 0.0, 0.0, 2.0).with_id("bg-clip"));

    let mut audio = Track::new(TrackKind::Audio).named("A1");
    let mut music_clip = Clip::new("music", ClipKind::Audio, 1.0, 0.0, 1.0).with_id("music-clip");
    music_clip.volume = 0.5;
    audio.clips.push(music_clip);

    let sequence = &mut project.sequences[0];
    sequence.width = WIDTH;
    sequence.height = HEIGHT;
    sequence.fps = FPS;
    sequence.sample_rate = SAMPLE_RATE;
    sequence.tracks = vec![overlay, video, audio];
    sequence.recompute_duration();
    project
}

pub fn sequence_id(project: &Project) -> String {
    project.sequences[0].id.clone()
}

pub fn compositor(project: &Project, decoder: Arc<SyntheticDecoder>) -> Arc<FrameCompositor> {
    let cache = Arc::new(MediaAssetCache::with_capacity(decoder, 16));
    cache.register_project(project);
    Arc::new(FrameCompositor::new(cache, Arc::new(EffectsPipeline::new())))
}

pub fn slow_decoder(latency_ms: u64) -> Arc<SyntheticDecoder> {
    Arc::new(SyntheticDecoder::new().with_latency(Duration::from_millis(latency_ms)))
}
