//! RGB <-> HSL conversion on normalized channels.
//!
//! Hue is expressed in turns (`0.0..1.0`), saturation and lightness in
//! `0.0..=1.0`.

pub fn rgb_to_hsl([r, g, b]: [f32; 3]) -> [f32; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) * 0.5;
    let delta = max - min;
    if delta <= f32::EPSILON {
        return [0.0, 0.0, l];
    }

    let s = if l > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };
    let h = if max == r {
        (g - b) / delta + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    [h / 6.0, s, l]
}

pub fn hsl_to_rgb([h, s, l]: [f32; 3]) -> [f32; 3] {
    if s <= f32::EPSILON {
        return [l, l, l];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        hue_channel(p, q, h + 1.0 / 3.0),
        hue_channel(p, q, h),
        hue_channel(p, q, h - 1.0 / 3.0),
    ]
}

/// Wrap a hue into `0.0..1.0`.
pub fn wrap_hue(h: f32) -> f32 {
    h.rem_euclid(1.0)
}

fn hue_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = wrap_hue(t);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn test_primaries() {
        assert!(close(rgb_to_hsl([1.0, 0.0, 0.0]), [0.0, 1.0, 0.5]));
        assert!(close(rgb_to_hsl([0.0, 1.0, 0.0]), [1.0 / 3.0, 1.0, 0.5]));
        assert!(close(rgb_to_hsl([0.0, 0.0, 1.0]), [2.0 / 3.0, 1.0, 0.5]));
        assert!(close(rgb_to_hsl([0.5, 0.5, 0.5]), [0.0, 0.0, 0.5]));
    }

    #[test]
    fn test_round_trip() {
        for rgb in [
            [0.2, 0.4, 0.6],
            [0.9, 0.1, 0.3],
            [0.05, 0.05, 0.8],
            [1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0],
        ] {
            assert!(close(hsl_to_rgb(rgb_to_hsl(rgb)), rgb), "{rgb:?}");
        }
    }

    #[test]
    fn test_wrap_hue() {
        assert!((wrap_hue(1.25) - 0.25).abs() < 1e-6);
        assert!((wrap_hue(-0.25) - 0.75).abs() < 1e-6);
    }
}
