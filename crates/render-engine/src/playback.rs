//! Real-time playback renderer.
//!
//! The renderer owns the playhead and a render surface. Each [`tick`] while
//! playing advances the playhead, composes the frame under a per-frame decode
//! budget, presents it, and mixes the elapsed audio into an optional sink.
//!
//! Seeks arrive through a cloneable [`PlaybackHandle`] so UI code can issue
//! them without waiting for a tick. Every seek bumps a generation counter;
//! a frame whose composition straddled a seek is dropped instead of
//! presented.
//!
//! The renderer composes through its own [`RenderScope`], so its fallback
//! frames and its decode cancellation never reach an export running on the
//! same compositor.
//!
//! [`tick`]: PlaybackRenderer::tick

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cutline_common::{CutlineError, CutlineResult, FrameClock, PlaybackDefaults};
use cutline_project_model::{AudioBuffer, FrameBuffer, Project, SequenceId};
use tokio::time::Instant;

use crate::compositor::{FetchPolicy, FrameCompositor, RenderScope};

/// Where composed frames are shown.
pub trait RenderSurface: Send {
    fn present(&mut self, frame: &FrameBuffer, time: f64) -> CutlineResult<()>;

    /// Called once when the renderer lets go of the surface.
    fn release(&mut self) {}
}

/// Receives the mixed audio of each tick.
pub trait AudioSink: Send {
    fn write(&mut self, audio: &AudioBuffer) -> CutlineResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Attached,
    Playing,
    Paused,
    Disposed,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing to do (not playing and no pending seek).
    Skipped,
    /// A frame was presented. `complete` is false when a layer came from a
    /// last-good frame or was left out.
    Presented { time: f64, complete: bool },
    /// The composed frame was discarded because a seek arrived meanwhile.
    Stale,
    /// The playhead reached the sequence end and playback paused.
    Ended { time: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub presented: u64,
    pub incomplete: u64,
    pub stale_discarded: u64,
}

#[derive(Debug, Default)]
struct SeekState {
    generation: AtomicU64,
    pending: Mutex<Option<f64>>,
}

/// Cloneable, non-blocking control handle for a renderer.
#[derive(Debug, Clone, Default)]
pub struct PlaybackHandle {
    inner: Arc<SeekState>,
}

impl PlaybackHandle {
    /// Request a seek to `time`. Repeating the pending seek is a no-op.
    pub fn seek(&self, time: f64) {
        if !time.is_finite() {
            return;
        }
        let mut pending = self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if *pending == Some(time) {
            return;
        }
        *pending = Some(time);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn take_pending(&self) -> Option<f64> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

pub struct PlaybackRenderer {
    project: Arc<Project>,
    sequence_id: SequenceId,
    compositor: Arc<FrameCompositor>,
    scope: RenderScope,
    surface: Option<Box<dyn RenderSurface>>,
    audio: Option<Box<dyn AudioSink>>,
    state: PlaybackState,
    playhead: f64,
    handle: PlaybackHandle,
    frame_budget: Duration,
    master_volume: f32,
    stats: PlaybackStats,
}

impl std::fmt::Debug for PlaybackRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackRenderer")
            .field("sequence_id", &self.sequence_id)
            .field("state", &self.state)
            .field("playhead", &self.playhead)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl PlaybackRenderer {
    pub fn new(
        project: Arc<Project>,
        sequence_id: impl Into<SequenceId>,
        compositor: Arc<FrameCompositor>,
        defaults: &PlaybackDefaults,
    ) -> CutlineResult<Self> {
        let sequence_id = sequence_id.into();
        let Some(sequence) = project.sequence(&sequence_id) else {
            return Err(CutlineError::validation(format!(
                "sequence {sequence_id} does not exist"
            )));
        };
        let frame_budget = match defaults.frame_budget_ms {
            0 => FrameClock::new(sequence.fps).frame_duration(),
            ms => Duration::from_millis(ms),
        };
        Ok(Self {
            project,
            sequence_id,
            compositor,
            scope: RenderScope::new(),
            surface: None,
            audio: None,
            state: PlaybackState::Idle,
            playhead: 0.0,
            handle: PlaybackHandle::default(),
            frame_budget,
            master_volume: defaults.master_volume.clamp(0.0, 2.0),
            stats: PlaybackStats::default(),
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 2.0);
    }

    /// Bind a surface. Replaces a previously attached one.
    pub fn attach(&mut self, surface: Box<dyn RenderSurface>) -> CutlineResult<()> {
        if self.state == PlaybackState::Disposed {
            return Err(CutlineError::surface_unavailable("renderer has been disposed"));
        }
        if let Some(mut old) = self.surface.replace(surface) {
            old.release();
        }
        if self.state == PlaybackState::Idle {
            self.state = PlaybackState::Attached;
        }
        tracing::debug!(sequence_id = %self.sequence_id, "Surface attached");
        Ok(())
    }

    pub fn set_audio_sink(&mut self, sink: Option<Box<dyn AudioSink>>) {
        self.audio = sink;
    }

    /// Swap in an edited project. The playhead is kept, clamped to the new end.
    pub fn set_project(&mut self, project: Arc<Project>) -> CutlineResult<()> {
        if project.sequence(&self.sequence_id).is_none() {
            return Err(CutlineError::validation(format!(
                "sequence {} does not exist",
                self.sequence_id
            )));
        }
        self.project = project;
        self.playhead = self.playhead.clamp(0.0, self.sequence_end());
        Ok(())
    }

    pub fn play(&mut self) -> CutlineResult<()> {
        self.require_surface("play")?;
        if self.playhead >= self.sequence_end() {
            self.playhead = 0.0;
        }
        self.state = PlaybackState::Playing;
        tracing::debug!(playhead = self.playhead, "Playback started");
        Ok(())
    }

    pub fn pause(&mut self) -> CutlineResult<()> {
        self.require_surface("pause")?;
        self.state = PlaybackState::Paused;
        Ok(())
    }

    /// Seek directly (same as seeking through the handle).
    pub fn seek(&self, time: f64) {
        self.handle.seek(time);
    }

    /// Advance by `dt` and render one frame.
    ///
    /// Video and audio decodes share one deadline, a frame budget from the
    /// start of the tick. Whatever misses it is drawn from the last good
    /// frame, left out, or mixed as silence.
    pub async fn tick(&mut self, dt: Duration) -> CutlineResult<TickOutcome> {
        match self.state {
            PlaybackState::Disposed => {
                return Err(CutlineError::surface_unavailable("renderer has been disposed"))
            }
            PlaybackState::Idle => return Ok(TickOutcome::Skipped),
            _ => {}
        }

        let end = self.sequence_end();
        let sought = self.handle.take_pending();
        if let Some(time) = sought {
            self.playhead = time.clamp(0.0, end);
            self.scope.reset();
        }

        let playing = self.state == PlaybackState::Playing;
        if !playing && sought.is_none() {
            return Ok(TickOutcome::Skipped);
        }

        let policy = FetchPolicy::Deadline(Instant::now() + self.frame_budget);
        let audio_from = self.playhead;
        if playing && sought.is_none() {
            self.playhead += dt.as_secs_f64();
        }
        if playing && self.playhead >= end {
            self.playhead = end;
            let audio = self.audio_mix().span(audio_from, end - audio_from, policy).await;
            self.write_audio(audio);
            self.state = PlaybackState::Paused;
            tracing::debug!(time = end, "Reached sequence end");
            return Ok(TickOutcome::Ended { time: end });
        }

        let generation = self.handle.generation();
        let time = self.playhead;
        let audio_span = if playing && sought.is_none() {
            time - audio_from
        } else {
            0.0
        };
        let (composed, audio) = tokio::join!(
            self.compositor.compose_video(
                &self.scope,
                &self.project,
                &self.sequence_id,
                time,
                policy,
            ),
            self.audio_mix().span(audio_from, audio_span, policy),
        );
        let composed = composed?;
        if self.handle.generation() != generation {
            self.stats.stale_discarded += 1;
            return Ok(TickOutcome::Stale);
        }

        if let Some(surface) = self.surface.as_mut() {
            surface.present(&composed.frame, time)?;
        }
        self.stats.presented += 1;
        let complete = composed.is_complete();
        if !complete {
            self.stats.incomplete += 1;
        }

        self.write_audio(audio);
        Ok(TickOutcome::Presented { time, complete })
    }

    /// Release the surface and cancel this renderer's pending decodes. Safe
    /// to call twice.
    pub fn dispose(&mut self) {
        if self.state == PlaybackState::Disposed {
            return;
        }
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
        self.audio = None;
        let cancelled = self.compositor.cache().cancel_owned(self.scope.owner());
        self.scope.reset();
        self.state = PlaybackState::Disposed;
        tracing::debug!(cancelled, "Playback renderer disposed");
    }

    fn require_surface(&self, action: &str) -> CutlineResult<()> {
        if self.state == PlaybackState::Disposed || self.surface.is_none() {
            return Err(CutlineError::surface_unavailable(format!(
                "cannot {action} without an attached surface"
            )));
        }
        Ok(())
    }

    fn sequence_end(&self) -> f64 {
        self.project
            .sequence(&self.sequence_id)
            .map(|s| s.duration)
            .unwrap_or(0.0)
    }

    fn audio_mix(&self) -> AudioMix<'_> {
        AudioMix {
            compositor: &self.compositor,
            scope: &self.scope,
            project: &self.project,
            sequence_id: &self.sequence_id,
            master_volume: self.master_volume,
            wanted: self.audio.is_some(),
        }
    }

    fn write_audio(&mut self, audio: Option<AudioBuffer>) {
        if let (Some(audio), Some(sink)) = (audio, self.audio.as_mut()) {
            if let Err(e) = sink.write(&audio) {
                tracing::warn!(error = %e, "Audio sink rejected samples");
            }
        }
    }
}

/// What a tick's audio mix borrows from the renderer.
struct AudioMix<'a> {
    compositor: &'a FrameCompositor,
    scope: &'a RenderScope,
    project: &'a Project,
    sequence_id: &'a str,
    master_volume: f32,
    /// A sink is attached.
    wanted: bool,
}

impl AudioMix<'_> {
    /// Audio for `[start, start + duration)`, if a sink wants it.
    async fn span(self, start: f64, duration: f64, policy: FetchPolicy) -> Option<AudioBuffer> {
        if !self.wanted || duration <= 0.0 {
            return None;
        }
        let mixed = self
            .compositor
            .mix_audio(
                self.scope,
                self.project,
                self.sequence_id,
                start,
                duration,
                self.master_volume,
                policy,
            )
            .await;
        match mixed {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(error = %e, "Audio mix failed");
                None
            }
        }
    }
}
