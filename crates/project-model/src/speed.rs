//! Keyframed variable-speed playback.
//!
//! A [`SpeedCurve`] maps a normalized source position `x ∈ [0, 1]` to a
//! playback speed. Playing `dx` of a source span `D` takes `D·dx / speed(x)`
//! seconds of timeline time, so the timeline length of a clip is the integral
//! of `D / speed` over `[0, 1]`.
//!
//! Both directions of the mapping are computed from the same discrete
//! integral (`SPEED_SAMPLES` trapezoids) so they stay mutually consistent.

use serde::{Deserialize, Serialize};

/// Number of trapezoids used to integrate a speed curve.
pub const SPEED_SAMPLES: usize = 1000;

/// Speeds below this are treated as this value when integrating.
pub const MIN_SPEED: f64 = 0.001;

/// Relative speed error allowed when an eased curve is split into linear
/// pieces.
pub const SPLIT_TOLERANCE: f64 = 1e-5;

/// Bisection depth bounds for splitting an eased segment.
const SPLIT_MIN_DEPTH: u32 = 3;
const SPLIT_MAX_DEPTH: u32 = 10;

/// A single speed keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedKeyframe {
    /// Normalized position in the source window [0.0, 1.0].
    pub time: f64,

    /// Playback speed multiplier (`0` is a freeze frame).
    pub speed: f64,
}

/// Easing applied to the progress between two keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Easing {
    /// Cubic ease-in-out.
    #[default]
    EaseInOut,
    Linear,
    /// CSS-style cubic Bézier through (0,0), (x1,y1), (x2,y2), (1,1).
    CubicBezier { x1: f64, y1: f64, x2: f64, y2: f64 },
}

/// Keyframed speed curve over a clip's source window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpeedCurve {
    /// Keyframes sorted by `time`.
    pub keyframes: Vec<SpeedKeyframe>,

    /// Easing between consecutive keyframes.
    #[serde(default)]
    pub easing: Easing,
}

impl Easing {
    /// Map linear progress `t ∈ [0, 1]` to eased progress.
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::CubicBezier { x1, y1, x2, y2 } => cubic_bezier(t, x1, y1, x2, y2),
        }
    }
}

impl SpeedCurve {
    /// Build a curve, sorting keyframes and clamping them to valid ranges.
    pub fn new(keyframes: Vec<SpeedKeyframe>, easing: Easing) -> Self {
        let mut curve = Self { keyframes, easing };
        curve.normalize();
        curve
    }

    /// A curve that plays at a single constant speed.
    pub fn constant(speed: f64) -> Self {
        Self::new(
            vec![
                SpeedKeyframe { time: 0.0, speed },
                SpeedKeyframe { time: 1.0, speed },
            ],
            Easing::Linear,
        )
    }

    /// Sort keyframes by time and clamp `time` to [0,1], `speed` to >= 0.
    pub fn normalize(&mut self) {
        for kf in &mut self.keyframes {
            kf.time = if kf.time.is_finite() {
                kf.time.clamp(0.0, 1.0)
            } else {
                0.0
            };
            kf.speed = if kf.speed.is_finite() {
                kf.speed.max(0.0)
            } else {
                1.0
            };
        }
        self.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Whether the keyframes are in range and sorted.
    pub fn is_valid(&self) -> bool {
        self.keyframes
            .iter()
            .all(|k| (0.0..=1.0).contains(&k.time) && k.speed >= 0.0 && k.speed.is_finite())
            && self.keyframes.windows(2).all(|w| w[0].time <= w[1].time)
    }

    /// Speed at normalized position `t`.
    pub fn speed_at(&self, t: f64) -> f64 {
        let kfs = &self.keyframes;
        let (first, last) = match (kfs.first(), kfs.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return 1.0,
        };

        if t <= first.time {
            return first.speed;
        }
        if t >= last.time {
            return last.speed;
        }

        // Index of the first keyframe strictly after t; t is inside the range
        // so 1 <= idx < len.
        let idx = kfs.partition_point(|k| k.time <= t);
        let a = &kfs[idx - 1];
        let b = &kfs[idx];

        let span = b.time - a.time;
        if span <= f64::EPSILON {
            return b.speed;
        }
        let progress = (t - a.time) / span;
        let eased = self.easing.apply(progress);
        a.speed + (b.speed - a.speed) * eased
    }

    /// Split the curve at normalized position `at` into two curves over the
    /// left `[0, at]` and right `[at, 1]` windows, each renormalized to [0,1].
    ///
    /// Both halves follow the original shape, so the time each half takes
    /// to play is the time the original spent in that window. Eased curves
    /// come back as dense linear curves, since easing is applied per segment
    /// and a cut segment would otherwise be eased over its new length.
    pub fn split_at(&self, at: f64) -> (SpeedCurve, SpeedCurve) {
        let at = at.clamp(0.0, 1.0);
        (self.window(0.0, at), self.window(at, 1.0))
    }

    /// The part of the curve over `[from, to]`, renormalized to [0,1].
    fn window(&self, from: f64, to: f64) -> SpeedCurve {
        let width = to - from;
        if width <= f64::EPSILON {
            return SpeedCurve::constant(self.speed_at(from));
        }

        let mut anchors = vec![(from, self.speed_at(from))];
        anchors.extend(
            self.keyframes
                .iter()
                .filter(|k| k.time > from && k.time < to)
                .map(|k| (k.time, k.speed)),
        );
        anchors.push((to, self.speed_at(to)));

        let points = if self.easing == Easing::Linear {
            anchors
        } else {
            let mut points = vec![anchors[0]];
            for pair in anchors.windows(2) {
                if pair[1].0 > pair[0].0 {
                    self.refine(pair[0], pair[1], 0, &mut points);
                }
                points.push(pair[1]);
            }
            points
        };

        let keyframes = points
            .into_iter()
            .map(|(t, speed)| SpeedKeyframe {
                time: ((t - from) / width).clamp(0.0, 1.0),
                speed,
            })
            .collect();
        SpeedCurve::new(keyframes, Easing::Linear)
    }

    /// Push the samples strictly between `a` and `b` needed for a linear
    /// curve through them to follow this one within `SPLIT_TOLERANCE`.
    fn refine(&self, a: (f64, f64), b: (f64, f64), depth: u32, out: &mut Vec<(f64, f64)>) {
        if depth >= SPLIT_MAX_DEPTH {
            return;
        }
        let mid = 0.5 * (a.0 + b.0);
        let speed = self.speed_at(mid);
        let error = (speed - 0.5 * (a.1 + b.1)).abs();
        // Eased segments are symmetric about their midpoint, so the first
        // levels always subdivide.
        if depth >= SPLIT_MIN_DEPTH && error <= SPLIT_TOLERANCE * speed.max(MIN_SPEED) {
            return;
        }
        self.refine(a, (mid, speed), depth + 1, out);
        out.push((mid, speed));
        self.refine((mid, speed), b, depth + 1, out);
    }

    fn integrand(&self, x: f64) -> f64 {
        1.0 / self.speed_at(x).max(MIN_SPEED)
    }
}

/// Timeline duration of a source window of `original_duration` seconds
/// played through `curve`.
pub fn effective_duration(curve: Option<&SpeedCurve>, original_duration: f64) -> f64 {
    if original_duration <= 0.0 {
        return 0.0;
    }
    let curve = match curve {
        Some(c) if !c.keyframes.is_empty() => c,
        _ => return original_duration,
    };

    let h = 1.0 / SPEED_SAMPLES as f64;
    let mut total = 0.0;
    let mut prev = curve.integrand(0.0);
    for i in 1..=SPEED_SAMPLES {
        let next = curve.integrand(i as f64 * h);
        total += (prev + next) * 0.5 * h;
        prev = next;
    }
    total * original_duration
}

/// Source position (seconds into the source window) reached after
/// `playback_time` seconds of timeline playback.
///
/// Clamped to `[0, original_duration]`.
pub fn source_position_for_playback_time(
    playback_time: f64,
    curve: Option<&SpeedCurve>,
    original_duration: f64,
) -> f64 {
    if original_duration <= 0.0 || playback_time <= 0.0 {
        return 0.0;
    }
    let curve = match curve {
        Some(c) if !c.keyframes.is_empty() => c,
        _ => return playback_time.min(original_duration),
    };

    let h = 1.0 / SPEED_SAMPLES as f64;
    let target = playback_time / original_duration;
    let mut elapsed = 0.0;
    let mut prev = curve.integrand(0.0);
    for i in 0..SPEED_SAMPLES {
        let next = curve.integrand((i + 1) as f64 * h);
        let step = (prev + next) * 0.5 * h;
        if elapsed + step >= target {
            let frac = if step > 0.0 {
                (target - elapsed) / step
            } else {
                0.0
            };
            let x = (i as f64 + frac) * h;
            return (x * original_duration).clamp(0.0, original_duration);
        }
        elapsed += step;
        prev = next;
    }
    original_duration
}

/// Timeline seconds needed to play from the start of the source window to
/// `source_position`. Inverse of [`source_position_for_playback_time`].
pub fn playback_time_for_source_position(
    source_position: f64,
    curve: Option<&SpeedCurve>,
    original_duration: f64,
) -> f64 {
    if original_duration <= 0.0 || source_position <= 0.0 {
        return 0.0;
    }
    let curve = match curve {
        Some(c) if !c.keyframes.is_empty() => c,
        _ => return source_position.min(original_duration),
    };

    let x_target = (source_position / original_duration).min(1.0);
    let h = 1.0 / SPEED_SAMPLES as f64;
    let mut elapsed = 0.0;
    let mut prev = curve.integrand(0.0);
    for i in 0..SPEED_SAMPLES {
        let x0 = i as f64 * h;
        let next = curve.integrand(x0 + h);
        let step = (prev + next) * 0.5 * h;
        if x0 + h >= x_target {
            let frac = (x_target - x0) / h;
            elapsed += step * frac;
            break;
        }
        elapsed += step;
        prev = next;
    }
    elapsed * original_duration
}

/// Evaluate a CSS-style cubic Bézier easing at `x`.
fn cubic_bezier(x: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    // Control x coordinates outside [0,1] make x(s) non-monotonic.
    let x1 = x1.clamp(0.0, 1.0);
    let x2 = x2.clamp(0.0, 1.0);

    let bez = |s: f64, p1: f64, p2: f64| {
        let inv = 1.0 - s;
        3.0 * inv * inv * s * p1 + 3.0 * inv * s * s * p2 + s * s * s
    };
    let bez_deriv = |s: f64, p1: f64, p2: f64| {
        let inv = 1.0 - s;
        3.0 * inv * inv * p1 + 6.0 * inv * s * (p2 - p1) + 3.0 * s * s * (1.0 - p2)
    };

    // Newton first, bisection if the derivative flattens out.
    let mut s = x;
    for _ in 0..8 {
        let err = bez(s, x1, x2) - x;
        if err.abs() < 1e-7 {
            return bez(s, y1, y2);
        }
        let d = bez_deriv(s, x1, x2);
        if d.abs() < 1e-6 {
            break;
        }
        s = (s - err / d).clamp(0.0, 1.0);
    }

    let (mut lo, mut hi) = (0.0, 1.0);
    s = x;
    for _ in 0..50 {
        let v = bez(s, x1, x2);
        if (v - x).abs() < 1e-7 {
            break;
        }
        if v < x {
            lo = s;
        } else {
            hi = s;
        }
        s = (lo + hi) / 2.0;
    }
    bez(s, y1, y2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf(time: f64, speed: f64) -> SpeedKeyframe {
        SpeedKeyframe { time, speed }
    }

    #[test]
    fn test_no_keyframes_is_unit_speed() {
        let curve = SpeedCurve::default();
        assert_eq!(curve.speed_at(0.3), 1.0);
        assert_eq!(effective_duration(Some(&curve), 7.5), 7.5);
        assert_eq!(effective_duration(None, 7.5), 7.5);
    }

    #[test]
    fn test_speed_clamps_outside_keyframes() {
        let curve = SpeedCurve::new(vec![kf(0.2, 0.5), kf(0.8, 3.0)], Easing::Linear);
        assert_eq!(curve.speed_at(0.0), 0.5);
        assert_eq!(curve.speed_at(0.1), 0.5);
        assert_eq!(curve.speed_at(0.9), 3.0);
        assert_eq!(curve.speed_at(1.0), 3.0);
    }

    #[test]
    fn test_easing_shapes_interpolation() {
        let linear = SpeedCurve::new(vec![kf(0.0, 1.0), kf(1.0, 3.0)], Easing::Linear);
        let eased = SpeedCurve::new(vec![kf(0.0, 1.0), kf(1.0, 3.0)], Easing::EaseInOut);

        assert!((linear.speed_at(0.25) - 1.5).abs() < 1e-12);
        // Cubic ease-in-out: 4·0.25³ = 0.0625 of the way.
        assert!((eased.speed_at(0.25) - 1.125).abs() < 1e-12);
        // Midpoint is symmetric for both.
        assert!((eased.speed_at(0.5) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cubic_bezier_endpoints_and_linear_case() {
        let linear_like = Easing::CubicBezier {
            x1: 0.25,
            y1: 0.25,
            x2: 0.75,
            y2: 0.75,
        };
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert!((linear_like.apply(t) - t).abs() < 1e-4, "t = {t}");
        }

        let ease = Easing::CubicBezier {
            x1: 0.42,
            y1: 0.0,
            x2: 0.58,
            y2: 1.0,
        };
        assert!(ease.apply(0.0).abs() < 1e-6);
        assert!((ease.apply(1.0) - 1.0).abs() < 1e-6);
        assert!(ease.apply(0.2) < 0.2);
        assert!(ease.apply(0.8) > 0.8);
    }

    #[test]
    fn test_ramp_effective_duration_linear() {
        let curve = SpeedCurve::new(vec![kf(0.0, 0.5), kf(1.0, 2.0)], Easing::Linear);
        let d = effective_duration(Some(&curve), 10.0);
        // ∫ 10 / (0.5 + 1.5x) dx = 10·ln(4) / 1.5
        let exact = 10.0 * 4.0_f64.ln() / 1.5;
        assert!((d - exact).abs() / exact < 0.02, "d = {d}, exact = {exact}");
    }

    #[test]
    fn test_ramp_effective_duration_default_easing_is_bounded() {
        let curve = SpeedCurve::new(vec![kf(0.0, 0.5), kf(1.0, 2.0)], Easing::default());
        let d = effective_duration(Some(&curve), 10.0);
        assert!(d > 5.0 && d < 20.0, "d = {d}");
    }

    #[test]
    fn test_freeze_frame_is_floored() {
        let curve = SpeedCurve::constant(0.0);
        let d = effective_duration(Some(&curve), 1.0);
        assert!((d - 1.0 / MIN_SPEED).abs() < 1e-6);
    }

    #[test]
    fn test_inverse_endpoints() {
        let curve = SpeedCurve::new(vec![kf(0.0, 0.5), kf(1.0, 2.0)], Easing::EaseInOut);
        let total = effective_duration(Some(&curve), 10.0);
        assert_eq!(source_position_for_playback_time(-1.0, Some(&curve), 10.0), 0.0);
        assert!((source_position_for_playback_time(total, Some(&curve), 10.0) - 10.0).abs() < 1e-6);
        assert_eq!(
            source_position_for_playback_time(total * 2.0, Some(&curve), 10.0),
            10.0
        );
    }

    #[test]
    fn test_forward_and_inverse_compose() {
        let curve = SpeedCurve::new(
            vec![kf(0.0, 0.5), kf(0.4, 4.0), kf(1.0, 1.0)],
            Easing::EaseInOut,
        );
        for i in 0..=20 {
            let s = 10.0 * i as f64 / 20.0;
            let t = playback_time_for_source_position(s, Some(&curve), 10.0);
            let back = source_position_for_playback_time(t, Some(&curve), 10.0);
            assert!((back - s).abs() < 1e-6, "s = {s}, back = {back}");
        }
    }

    #[test]
    fn test_constant_curve_scales_linearly() {
        let curve = SpeedCurve::constant(2.0);
        let total = effective_duration(Some(&curve), 8.0);
        assert!((total - 4.0).abs() < 1e-9);
        let pos = source_position_for_playback_time(1.0, Some(&curve), 8.0);
        assert!((pos - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_keeps_boundary_speed() {
        let curve = SpeedCurve::new(vec![kf(0.0, 1.0), kf(1.0, 3.0)], Easing::Linear);
        let (left, right) = curve.split_at(0.5);
        assert!((left.speed_at(1.0) - 2.0).abs() < 1e-12);
        assert!((right.speed_at(0.0) - 2.0).abs() < 1e-12);
        assert!((left.speed_at(0.0) - 1.0).abs() < 1e-12);
        assert!((right.speed_at(1.0) - 3.0).abs() < 1e-12);
        assert!(left.is_valid() && right.is_valid());
    }

    #[test]
    fn test_split_eased_curve_keeps_its_shape() {
        let curve = SpeedCurve::new(vec![kf(0.0, 0.5), kf(1.0, 2.0)], Easing::EaseInOut);
        let at = 0.3;
        let (left, right) = curve.split_at(at);
        assert_eq!(left.easing, Easing::Linear);
        assert_eq!(right.easing, Easing::Linear);

        for i in 0..=20 {
            let u = i as f64 / 20.0;
            assert!((left.speed_at(u) - curve.speed_at(u * at)).abs() < 1e-3, "u = {u}");
            let x = at + u * (1.0 - at);
            assert!((right.speed_at(u) - curve.speed_at(x)).abs() < 1e-3, "u = {u}");
        }

        let whole = effective_duration(Some(&curve), 10.0);
        let left_len = effective_duration(Some(&left), 10.0 * at);
        let right_len = effective_duration(Some(&right), 10.0 * (1.0 - at));
        let before = playback_time_for_source_position(10.0 * at, Some(&curve), 10.0);
        assert!((left_len - before).abs() / before < 1e-4, "{left_len} vs {before}");
        assert!((left_len + right_len - whole).abs() / whole < 1e-4);
    }

    #[test]
    fn test_split_linear_curve_stays_sparse() {
        let curve = SpeedCurve::new(vec![kf(0.0, 1.0), kf(0.5, 2.0), kf(1.0, 1.0)], Easing::Linear);
        let (left, right) = curve.split_at(0.25);
        assert_eq!(left.keyframes.len(), 2);
        assert_eq!(right.keyframes.len(), 3);
        assert!((right.keyframes[1].time - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_sorts_and_clamps() {
        let curve = SpeedCurve::new(vec![kf(1.5, 2.0), kf(-0.5, -1.0)], Easing::Linear);
        assert_eq!(curve.keyframes[0], kf(0.0, 0.0));
        assert_eq!(curve.keyframes[1], kf(1.0, 2.0));
    }

    #[test]
    fn test_easing_serialization() {
        let curve = SpeedCurve::new(
            vec![kf(0.0, 1.0)],
            Easing::CubicBezier {
                x1: 0.1,
                y1: 0.2,
                x2: 0.3,
                y2: 0.4,
            },
        );
        let json = serde_json::to_string(&curve).unwrap();
        assert!(json.contains("\"type\":\"cubic-bezier\""));
        let parsed: SpeedCurve = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, curve);

        let legacy: SpeedCurve =
            serde_json::from_str(r#"{"keyframes":[{"time":0.0,"speed":1.0}]}"#).unwrap();
        assert_eq!(legacy.easing, Easing::EaseInOut);
    }
}
