mod common;

use std::sync::Arc;
use std::time::Duration;

use cutline_media_cache::{pattern_color, SyntheticDecoder};
use cutline_project_model::{Clip, ClipKind, Effect, EffectKind, FrameBuffer, Track, TrackKind};
use cutline_render_engine::compositor::BACKGROUND;
use cutline_render_engine::{FetchPolicy, RenderScope};

use common::{HEIGHT, WIDTH};

fn solid(rgba: [u8; 4]) -> FrameBuffer {
    FrameBuffer::solid(WIDTH, HEIGHT, rgba)
}

#[tokio::test]
async fn test_layers_paint_bottom_track_first() {
    let project = common::project();
    let seq = common::sequence_id(&project);
    let compositor = common::compositor(&project, Arc::new(SyntheticDecoder::new()));
    let scope = RenderScope::new();

    let only_bg = compositor
        .compose_video(&scope, &project, &seq, 0.5, FetchPolicy::Wait)
        .await
        .unwrap();
    assert!(only_bg.is_complete());
    assert_eq!(only_bg.fresh_layers, 1);
    assert_eq!(only_bg.frame.pixel(10, 10), pattern_color("bg", 5));

    let both = compositor
        .compose_video(&scope, &project, &seq, 1.5, FetchPolicy::Wait)
        .await
        .unwrap();
    let mut expected = solid(BACKGROUND);
    expected.blit_over(&solid(pattern_color("bg", 15)), 0, 0, 1.0);
    expected.blit_over(&solid(pattern_color("still", 0)), 0, 0, 0.5);
    assert_eq!(both.fresh_layers, 2);
    assert_eq!(both.frame, expected);
}

#[tokio::test]
async fn test_gap_is_background() {
    let project = common::project();
    let seq = common::sequence_id(&project);
    let compositor = common::compositor(&project, Arc::new(SyntheticDecoder::new()));
    let scope = RenderScope::new();

    // Half-open: nothing is active at the sequence end.
    let frame = compositor
        .compose_video(&scope, &project, &seq, 2.0, FetchPolicy::Wait)
        .await
        .unwrap();
    assert_eq!(frame.frame, solid(BACKGROUND));
    assert_eq!(frame.fresh_layers, 0);
}

#[tokio::test]
async fn test_budget_and_wait_agree_when_decodes_are_fast() {
    let project = common::project();
    let seq = common::sequence_id(&project);
    let compositor = common::compositor(&project, Arc::new(SyntheticDecoder::new()));
    let scope = RenderScope::new();

    let waited = compositor
        .compose_video(&scope, &project, &seq, 1.2, FetchPolicy::Wait)
        .await
        .unwrap();
    let budgeted = compositor
        .compose_video(&scope, &project, &seq, 1.2, FetchPolicy::Budget(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(waited.frame, budgeted.frame);
}

#[tokio::test]
async fn test_budget_miss_falls_back_to_last_good_frame() {
    let project = common::project();
    let seq = common::sequence_id(&project);
    let compositor = common::compositor(&project, common::slow_decoder(100));
    let scope = RenderScope::new();
    let tight = FetchPolicy::Budget(Duration::from_millis(5));

    // No previous frame for the clip: the layer is left out.
    let first = compositor.compose_video(&scope, &project, &seq, 0.5, tight).await.unwrap();
    assert_eq!(first.missing_layers, 1);
    assert_eq!(first.frame, solid(BACKGROUND));

    compositor
        .compose_video(&scope, &project, &seq, 0.5, FetchPolicy::Wait)
        .await
        .unwrap();

    let later = compositor.compose_video(&scope, &project, &seq, 0.8, tight).await.unwrap();
    assert_eq!(later.stale_layers, 1);
    assert_eq!(later.frame.pixel(0, 0), pattern_color("bg", 5));
}

#[tokio::test]
async fn test_clip_effects_are_applied() {
    let mut project = common::project();
    let seq = common::sequence_id(&project);
    project.sequences[0].tracks[1].clips[0]
        .effects
        .push(Effect::new(EffectKind::BlackAndWhite));
    let compositor = common::compositor(&project, Arc::new(SyntheticDecoder::new()));
    let scope = RenderScope::new();

    let frame = compositor
        .compose_video(&scope, &project, &seq, 0.5, FetchPolicy::Wait)
        .await
        .unwrap();
    let [r, g, b, a] = frame.frame.pixel(3, 3);
    assert_eq!((r, r), (g, b));
    assert_eq!(a, 255);
}

#[tokio::test]
async fn test_adjustment_track_grades_layers_below() {
    let mut project = common::project();
    let seq = common::sequence_id(&project);
    let mut fx = Track::new(TrackKind::Fx);
    fx.clips.push(
        Clip::new("still", ClipKind::Image, 0.0, 0.0, 1.0)
            .with_effect(Effect::new(EffectKind::BlackAndWhite)),
    );
    project.sequences[0].tracks.insert(0, fx);
    let compositor = common::compositor(&project, Arc::new(SyntheticDecoder::new()));
    let scope = RenderScope::new();

    let frame = compositor
        .compose_video(&scope, &project, &seq, 0.5, FetchPolicy::Wait)
        .await
        .unwrap();
    let [r, g, b, _] = frame.frame.pixel(3, 3);
    assert_eq!((r, r), (g, b));
    // The adjustment clip's own media is never decoded.
    assert_eq!(frame.fresh_layers, 1);
}

#[tokio::test]
async fn test_audio_mix_honors_volumes_and_mute() {
    let mut project = common::project();
    let seq = common::sequence_id(&project);
    let decoder = Arc::new(SyntheticDecoder::new().with_audio_level(0.25));
    let compositor = common::compositor(&project, Arc::clone(&decoder));
    let scope = RenderScope::new();

    let mix = compositor
        .mix_audio(&scope, &project, &seq, 0.0, 3.0, 1.0, FetchPolicy::Wait)
        .await
        .unwrap();
    assert_eq!(mix.channels, 2);
    assert_eq!(mix.frames(), 3000);
    assert_eq!(mix.sample(500, 0), 0.0);
    assert_eq!(mix.sample(1500, 0), 0.125);
    assert_eq!(mix.sample(1500, 1), 0.125);
    assert_eq!(mix.sample(2500, 1), 0.0);

    let quieter = compositor
        .mix_audio(&scope, &project, &seq, 1.0, 1.0, 0.5, FetchPolicy::Wait)
        .await
        .unwrap();
    assert_eq!(quieter.sample(10, 0), 0.0625);

    project.sequences[0].tracks[2].muted = true;
    let muted = compositor
        .mix_audio(&scope, &project, &seq, 0.0, 3.0, 1.0, FetchPolicy::Wait)
        .await
        .unwrap();
    assert_eq!(muted.peak(), 0.0);
}

#[tokio::test]
async fn test_last_good_frames_are_per_scope() {
    let project = common::project();
    let seq = common::sequence_id(&project);
    let compositor = common::compositor(&project, common::slow_decoder(100));
    let tight = FetchPolicy::Budget(Duration::from_millis(5));

    let export = RenderScope::new();
    compositor
        .compose_video(&export, &project, &seq, 0.5, FetchPolicy::Wait)
        .await
        .unwrap();

    // Another consumer missing its budget gets nothing from the first one.
    let preview = RenderScope::new();
    let missed = compositor.compose_video(&preview, &project, &seq, 0.8, tight).await.unwrap();
    assert_eq!(missed.stale_layers, 0);
    assert_eq!(missed.missing_layers, 1);
    assert_eq!(missed.frame, solid(BACKGROUND));

    let own = compositor.compose_video(&export, &project, &seq, 0.8, tight).await.unwrap();
    assert_eq!(own.stale_layers, 1);
    assert_eq!(own.frame.pixel(0, 0), pattern_color("bg", 5));
}

#[tokio::test]
async fn test_audio_past_the_deadline_is_silence() {
    let project = common::project();
    let seq = common::sequence_id(&project);
    let compositor = common::compositor(&project, common::slow_decoder(300));
    let scope = RenderScope::new();

    let started = std::time::Instant::now();
    let mix = compositor
        .mix_audio(&scope, &project, &seq, 1.0, 0.5, 1.0, FetchPolicy::Budget(Duration::from_millis(20)))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(mix.frames(), 500);
    assert_eq!(mix.peak(), 0.0);
}
