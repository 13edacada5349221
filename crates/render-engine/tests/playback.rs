mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cutline_common::{CutlineError, CutlineResult, PlaybackDefaults};
use cutline_media_cache::SyntheticDecoder;
use cutline_project_model::{AudioBuffer, FrameBuffer};
use cutline_render_engine::{
    AudioSink, PlaybackRenderer, PlaybackState, RenderSurface, TickOutcome,
};

#[derive(Default, Clone)]
struct Recorder {
    presented: Arc<Mutex<Vec<f64>>>,
    releases: Arc<AtomicUsize>,
    audio_frames: Arc<AtomicUsize>,
}

impl Recorder {
    fn times(&self) -> Vec<f64> {
        self.presented.lock().unwrap().clone()
    }
}

impl RenderSurface for Recorder {
    fn present(&mut self, _frame: &FrameBuffer, time: f64) -> CutlineResult<()> {
        self.presented.lock().unwrap().push(time);
        Ok(())
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioSink for Recorder {
    fn write(&mut self, audio: &AudioBuffer) -> CutlineResult<()> {
        self.audio_frames.fetch_add(audio.frames(), Ordering::SeqCst);
        Ok(())
    }
}

fn renderer(decoder: Arc<SyntheticDecoder>, budget_ms: u64) -> PlaybackRenderer {
    let project = common::project();
    let seq = common::sequence_id(&project);
    let compositor = common::compositor(&project, decoder);
    let defaults = PlaybackDefaults {
        master_volume: 1.0,
        frame_budget_ms: budget_ms,
    };
    PlaybackRenderer::new(Arc::new(project), seq, compositor, &defaults).unwrap()
}

#[tokio::test]
async fn test_play_requires_a_surface() {
    let mut renderer = renderer(Arc::new(SyntheticDecoder::new()), 0);
    let err = renderer.play().unwrap_err();
    assert!(matches!(err, CutlineError::SurfaceUnavailable { .. }));
    assert!(renderer.pause().is_err());
    assert_eq!(renderer.state(), PlaybackState::Idle);
    assert_eq!(renderer.tick(Duration::from_millis(100)).await.unwrap(), TickOutcome::Skipped);
}

#[tokio::test]
async fn test_state_machine() {
    let recorder = Recorder::default();
    let mut renderer = renderer(Arc::new(SyntheticDecoder::new()), 1000);

    renderer.attach(Box::new(recorder.clone())).unwrap();
    assert_eq!(renderer.state(), PlaybackState::Attached);

    renderer.play().unwrap();
    assert_eq!(renderer.state(), PlaybackState::Playing);
    let outcome = renderer.tick(Duration::from_millis(100)).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Presented { complete: true, .. }));
    assert!((renderer.playhead() - 0.1).abs() < 1e-9);

    renderer.pause().unwrap();
    assert_eq!(renderer.state(), PlaybackState::Paused);
    assert_eq!(renderer.tick(Duration::from_millis(100)).await.unwrap(), TickOutcome::Skipped);
    assert_eq!(recorder.times().len(), 1);
}

#[tokio::test]
async fn test_seek_while_paused_renders_the_new_position() {
    let recorder = Recorder::default();
    let mut renderer = renderer(Arc::new(SyntheticDecoder::new()), 1000);
    renderer.attach(Box::new(recorder.clone())).unwrap();
    renderer.pause().unwrap();

    let handle = renderer.handle();
    handle.seek(1.5);
    handle.seek(1.5);
    assert_eq!(handle.generation(), 1);

    let outcome = renderer.tick(Duration::from_millis(100)).await.unwrap();
    assert_eq!(outcome, TickOutcome::Presented { time: 1.5, complete: true });
    assert_eq!(renderer.playhead(), 1.5);

    // Seeks clamp to the sequence.
    handle.seek(99.0);
    renderer.tick(Duration::ZERO).await.unwrap();
    assert_eq!(renderer.playhead(), 2.0);
}

#[tokio::test]
async fn test_frame_composed_across_a_seek_is_discarded() {
    let recorder = Recorder::default();
    let mut renderer = renderer(common::slow_decoder(50), 1000);
    renderer.attach(Box::new(recorder.clone())).unwrap();
    renderer.play().unwrap();
    let handle = renderer.handle();

    let (outcome, _) = tokio::join!(renderer.tick(Duration::from_millis(100)), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.seek(1.0);
    });
    assert_eq!(outcome.unwrap(), TickOutcome::Stale);
    assert!(recorder.times().is_empty());
    assert_eq!(renderer.stats().stale_discarded, 1);

    let next = renderer.tick(Duration::from_millis(100)).await.unwrap();
    assert!(matches!(next, TickOutcome::Presented { time, .. } if time == 1.0));
    assert_eq!(recorder.times(), vec![1.0]);
}

#[tokio::test]
async fn test_playback_pauses_at_the_end() {
    let recorder = Recorder::default();
    let mut renderer = renderer(Arc::new(SyntheticDecoder::new()), 1000);
    renderer.attach(Box::new(recorder.clone())).unwrap();
    renderer.play().unwrap();
    renderer.seek(1.9);
    renderer.tick(Duration::ZERO).await.unwrap();

    let outcome = renderer.tick(Duration::from_millis(500)).await.unwrap();
    assert_eq!(outcome, TickOutcome::Ended { time: 2.0 });
    assert_eq!(renderer.state(), PlaybackState::Paused);

    // Playing again restarts from the top.
    renderer.play().unwrap();
    assert_eq!(renderer.playhead(), 0.0);
}

#[tokio::test]
async fn test_audio_reaches_the_sink() {
    let recorder = Recorder::default();
    let mut renderer = renderer(Arc::new(SyntheticDecoder::new()), 1000);
    renderer.attach(Box::new(recorder.clone())).unwrap();
    renderer.set_audio_sink(Some(Box::new(recorder.clone())));
    renderer.play().unwrap();

    renderer.tick(Duration::from_millis(100)).await.unwrap();
    renderer.tick(Duration::from_millis(100)).await.unwrap();
    // 0.2 s at 1 kHz.
    assert_eq!(recorder.audio_frames.load(Ordering::SeqCst), 200);
}

#[tokio::test]
async fn test_slow_audio_does_not_stall_the_tick() {
    let recorder = Recorder::default();
    let mut renderer = renderer(common::slow_decoder(800), 50);
    renderer.attach(Box::new(recorder.clone())).unwrap();
    renderer.set_audio_sink(Some(Box::new(recorder.clone())));

    renderer.seek(1.0);
    renderer.tick(Duration::ZERO).await.unwrap();
    renderer.play().unwrap();

    let started = std::time::Instant::now();
    let outcome = renderer.tick(Duration::from_millis(100)).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(400), "{:?}", started.elapsed());
    assert!(matches!(outcome, TickOutcome::Presented { complete: false, .. }));
    // The music decode missed the deadline and was mixed as silence.
    assert_eq!(recorder.audio_frames.load(Ordering::SeqCst), 100);
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
    let recorder = Recorder::default();
    let mut renderer = renderer(Arc::new(SyntheticDecoder::new()), 1000);
    renderer.attach(Box::new(recorder.clone())).unwrap();
    renderer.play().unwrap();

    renderer.dispose();
    renderer.dispose();
    assert_eq!(renderer.state(), PlaybackState::Disposed);
    assert_eq!(recorder.releases.load(Ordering::SeqCst), 1);

    assert!(matches!(
        renderer.play(),
        Err(CutlineError::SurfaceUnavailable { .. })
    ));
    assert!(renderer.attach(Box::new(recorder.clone())).is_err());
    assert!(renderer.tick(Duration::from_millis(10)).await.is_err());
}
