//! Frame clock and rate limiting utilities.
//!
//! Timeline time is measured in seconds (`f64`). Renderers and exporters
//! step through it in whole frames at the sequence frame rate; this module
//! provides the conversions and the throttle used for progress reporting.

use std::time::{Duration, Instant};

/// Frame/second conversions for a fixed frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: f64,
}

impl FrameClock {
    /// Create a clock for the given frame rate. Non-positive rates fall back to 30.
    pub fn new(fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        Self { fps }
    }

    /// Frames per second.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Duration of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    /// Timeline seconds at the start of `frame`.
    pub fn time_of(&self, frame: u64) -> f64 {
        frame as f64 / self.fps
    }

    /// Frame index containing `secs` (negative times map to frame 0).
    pub fn frame_at(&self, secs: f64) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        // Small epsilon keeps exact frame boundaries from rounding down.
        (secs * self.fps + 1e-9).floor() as u64
    }

    /// Number of frames needed to cover `duration_secs`.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 {
            return 0;
        }
        (duration_secs * self.fps - 1e-9).ceil().max(1.0) as u64
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs * 1_000_000_000.0) as u64
    }

    /// Convert nanoseconds to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }
}

/// Rate limiter for periodic reporting.
///
/// `should_emit` returns true at most once per `min_interval`; `is_overdue`
/// reports whether `max_silence` has passed since the last emission.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    max_silence: Duration,
    last_emit: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, max_silence: Duration) -> Self {
        Self {
            min_interval,
            max_silence: max_silence.max(min_interval),
            last_emit: None,
        }
    }

    /// Check whether enough time has passed for the next emission.
    /// Returns true and records the emission if ready.
    /// The first call always returns true.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            None => {
                self.last_emit = Some(now);
                true
            }
            Some(last) if now.duration_since(last) >= self.min_interval => {
                self.last_emit = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Whether the silence since the last emission exceeds the maximum.
    pub fn is_overdue(&self, now: Instant) -> bool {
        match self.last_emit {
            None => true,
            Some(last) => now.duration_since(last) >= self.max_silence,
        }
    }

    /// Record an emission that bypassed `should_emit`.
    pub fn mark(&mut self, now: Instant) {
        self.last_emit = Some(now);
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_silence(&self) -> Duration {
        self.max_silence
    }

    /// When the limiter next becomes overdue; `None` if it already is.
    pub fn next_due(&self) -> Option<Instant> {
        self.last_emit.map(|last| last + self.max_silence)
    }
}
