use std::sync::Arc;
use std::time::Duration;

use cutline_media_cache::{
    pattern_color, JobOwner, MediaAssetCache, MetadataRequest, SyntheticDecoder, SyntheticRequest,
};
use cutline_project_model::{AssetKind, MediaAssetMeta};

fn video(id: &str) -> MediaAssetMeta {
    MediaAssetMeta::new(id, AssetKind::Video, format!("{id}.mp4"), 10.0).with_id(id)
}

fn cache_with(decoder: &Arc<SyntheticDecoder>, slots: usize) -> MediaAssetCache {
    MediaAssetCache::with_capacity(decoder.clone(), slots)
}

#[tokio::test]
async fn test_repeat_frame_requests_hit_the_cache() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let cache = cache_with(&decoder, 4);
    cache.register_asset(video("a"));

    let first = cache.resolve_frame("a", 1.0).await.unwrap();
    // Same source frame at 30 fps.
    let second = cache.resolve_frame("a", 1.01).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(decoder.frame_decodes(), 1);
    assert_eq!(first.pixel(0, 0), pattern_color("a", 30));
}

#[tokio::test]
async fn test_eviction_keeps_outstanding_frames_valid() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let cache = cache_with(&decoder, 2);
    cache.register_asset(video("a"));

    let held = cache.resolve_frame("a", 0.0).await.unwrap();
    cache.resolve_frame("a", 1.0).await.unwrap();
    cache.resolve_frame("a", 2.0).await.unwrap();

    assert_eq!(cache.stats().cached_frames, 2);
    assert!(cache.cached_frame("a", 0.0).is_none());
    assert_eq!(held.pixel(1, 1), pattern_color("a", 0));

    // Evicted frame decodes again on demand.
    cache.resolve_frame("a", 0.0).await.unwrap();
    assert_eq!(decoder.frame_decodes(), 4);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_decode() {
    let decoder = Arc::new(SyntheticDecoder::new().with_latency(Duration::from_millis(30)));
    let cache = cache_with(&decoder, 4);
    cache.register_asset(video("a"));

    let (x, y, z) = tokio::join!(
        cache.resolve_frame("a", 2.0),
        cache.resolve_frame("a", 2.0),
        cache.ensure_thumbnails("a", 3),
    );
    assert!(Arc::ptr_eq(&x.unwrap(), &y.unwrap()));
    assert_eq!(z.unwrap().map(|t| t.len()), Some(3));
    assert_eq!(decoder.frame_decodes(), 1);

    let (t1, t2) = tokio::join!(cache.ensure_thumbnails("a", 5), cache.ensure_thumbnails("a", 5));
    assert_eq!(t1.unwrap(), t2.unwrap());
    assert_eq!(decoder.thumbnail_calls(), 2);
}

#[tokio::test]
async fn test_thumbnails_are_stored_on_the_asset() {
    let decoder = Arc::new(SyntheticDecoder::new());
    let cache = cache_with(&decoder, 4);
    cache.register_asset(video("a"));

    cache.ensure_thumbnails("a", 4).await.unwrap();
    let meta = cache.asset_meta("a").unwrap();
    assert_eq!(meta.thumbnails.map(|t| t.len()), Some(4));

    // Already satisfied.
    cache.ensure_thumbnails("a", 2).await.unwrap();
    assert_eq!(decoder.thumbnail_calls(), 1);
}

#[tokio::test]
async fn test_thumbnail_failure_is_not_retried() {
    let decoder = Arc::new(SyntheticDecoder::new());
    decoder.set_failing(SyntheticRequest::Thumbnails, true);
    let cache = cache_with(&decoder, 4);
    cache.register_asset(video("a"));

    assert_eq!(cache.ensure_thumbnails("a", 4).await.unwrap(), None);
    assert_eq!(cache.ensure_thumbnails("a", 4).await.unwrap(), None);
    assert_eq!(decoder.thumbnail_calls(), 1);
    assert!(cache.has_failed("a", MetadataRequest::Thumbnails));
    assert!(cache.asset_meta("a").unwrap().thumbnails.is_none());

    decoder.set_failing(SyntheticRequest::Thumbnails, false);
    cache.clear_failures();
    assert!(cache.ensure_thumbnails("a", 4).await.unwrap().is_some());
    assert_eq!(decoder.thumbnail_calls(), 2);
}

#[tokio::test]
async fn test_probe_skipped_when_dimensions_known() {
    let decoder = Arc::new(SyntheticDecoder::new().with_probe_size(320, 240));
    let cache = cache_with(&decoder, 4);
    cache.register_asset(video("known").with_dimensions(1920, 1080));
    cache.register_asset(video("zero").with_dimensions(1920, 0));
    cache.register_asset(video("unknown"));

    assert_eq!(cache.probe_dimensions("known").await.unwrap(), Some((1920, 1080)));
    assert_eq!(decoder.probe_calls(), 0);

    assert_eq!(cache.probe_dimensions("zero").await.unwrap(), Some((320, 240)));
    assert_eq!(cache.probe_dimensions("unknown").await.unwrap(), Some((320, 240)));
    assert_eq!(decoder.probe_calls(), 2);

    let meta = cache.asset_meta("unknown").unwrap();
    assert_eq!((meta.width, meta.height), (Some(320), Some(240)));
    assert_eq!(meta.fps, Some(30.0));
    assert_eq!(meta.duration, 10.0);

    // Now known: no further probe.
    cache.probe_dimensions("unknown").await.unwrap();
    assert_eq!(decoder.probe_calls(), 2);
}

#[tokio::test]
async fn test_probe_failure_leaves_dimensions_absent() {
    let decoder = Arc::new(SyntheticDecoder::new());
    decoder.set_failing(SyntheticRequest::Probe, true);
    let cache = cache_with(&decoder, 4);
    cache.register_asset(video("a"));

    assert_eq!(cache.probe_dimensions("a").await.unwrap(), None);
    assert_eq!(cache.probe_dimensions("a").await.unwrap(), None);
    assert_eq!(decoder.probe_calls(), 1);
    assert_eq!(cache.asset_meta("a").unwrap().width, None);
}

#[tokio::test]
async fn test_waveform_for_audio_assets() {
    let decoder = Arc::new(SyntheticDecoder::new().with_audio_level(0.4));
    let cache = cache_with(&decoder, 4);
    cache.register_asset(MediaAssetMeta::new("m", AssetKind::Audio, "m.wav", 2.0).with_id("m"));
    cache.register_asset(MediaAssetMeta::new("p", AssetKind::Image, "p.png", 0.0).with_id("p"));

    let wave = cache.ensure_waveform("m", 16).await.unwrap().unwrap();
    assert_eq!(wave.len(), 16);
    assert!(wave.iter().all(|p| (p - 0.4).abs() < 1e-6));
    assert_eq!(cache.asset_meta("m").unwrap().waveform, Some(wave));

    assert_eq!(cache.ensure_waveform("p", 16).await.unwrap(), None);
}

#[tokio::test]
async fn test_unregistered_asset_is_a_decode_error() {
    let cache = MediaAssetCache::with_capacity(Arc::new(SyntheticDecoder::new()), 2);
    let err = cache.resolve_frame("missing", 0.0).await.unwrap_err();
    assert!(matches!(err, cutline_common::CutlineError::Decode { .. }));
}

#[tokio::test]
async fn test_cancel_in_flight_aborts_decodes() {
    let decoder = Arc::new(SyntheticDecoder::new().with_latency(Duration::from_secs(30)));
    let cache = Arc::new(cache_with(&decoder, 4));
    cache.register_asset(video("a"));

    let waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.resolve_frame("a", 0.0).await })
    };
    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(cache.cancel_in_flight(), 1);
    assert!(waiter.await.unwrap().is_err());
    assert_eq!(cache.stats().cached_frames, 0);
}

#[tokio::test]
async fn test_cancel_owned_leaves_other_owners_running() {
    let decoder = Arc::new(SyntheticDecoder::new().with_latency(Duration::from_millis(100)));
    let cache = Arc::new(cache_with(&decoder, 4));
    cache.register_asset(video("a"));
    let (preview, export) = (JobOwner::unique(), JobOwner::unique());

    let spawn = |owner: JobOwner, time: f64| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.resolve_frame_for(owner, "a", time).await })
    };
    let preview_only = spawn(preview, 0.0);
    let export_only = spawn(export, 2.0);
    let both = [spawn(preview, 4.0), spawn(export, 4.0)];
    while cache.stats().in_flight < 3 {
        tokio::task::yield_now().await;
    }

    assert_eq!(cache.cancel_owned(preview), 1);
    assert!(preview_only.await.unwrap().is_err());
    assert_eq!(export_only.await.unwrap().unwrap().pixel(0, 0), pattern_color("a", 60));
    for waiter in both {
        assert_eq!(waiter.await.unwrap().unwrap().pixel(0, 0), pattern_color("a", 120));
    }
}
