//! Looks: grain, vignette, vintage, and the film preset.

use cutline_project_model::FrameBuffer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::color::s_curve;
use super::{luma, map_rgb, negligible, EffectApplyError, Params};

type EffectResult = Result<(), EffectApplyError>;

/// Peak per-channel noise at `amount = 1`.
const GRAIN_SCALE: f32 = 0.3;

/// Seed used by the film look when none is given, so its grain is stable.
const FILM_LOOK_SEED: u64 = 0x5EED_F11E;

/// Grain seed for an effect that sets none: FNV-1a of its id.
fn id_seed(id: &str) -> u64 {
    id.bytes().fold(0xCBF2_9CE4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01B3)
    })
}

/// RNG for one frame of grain. Same `(seed, frame_index)`, same noise.
pub fn grain_rng(seed: u64, frame_index: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ frame_index.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

pub fn grain(
    frame: &mut FrameBuffer,
    params: &Params<'_>,
    blend: f32,
    frame_index: u64,
) -> EffectResult {
    let amount = params.number("amount", 0.0, 0.0, 1.0)? as f32;
    let seed = params
        .optional_number("seed", 0.0, u32::MAX as f64)?
        .map(|s| s as u64)
        .unwrap_or_else(|| id_seed(params.effect_id()));
    let monochrome = params.flag("monochrome", false)?;
    if amount == 0.0 || negligible(blend) {
        return Ok(());
    }

    let mut rng = grain_rng(seed, frame_index);
    add_grain(frame, amount, monochrome, &mut rng, blend);
    Ok(())
}

pub fn vignette(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let amount = params.number("amount", 0.5, 0.0, 1.0)? as f32;
    let radius = params.number("radius", 0.75, 0.1, 1.5)? as f32;
    let softness = params.number("softness", 0.45, 0.01, 1.0)? as f32;
    if amount == 0.0 || negligible(blend) || frame.is_empty() {
        return Ok(());
    }

    let (w, h) = (frame.width() as f32, frame.height() as f32);
    // Normalized so the corners sit at distance 1.
    let norm = 0.5f32.sqrt();
    map_rgb(frame, blend, |x, y, rgb| {
        let dx = (x as f32 + 0.5) / w - 0.5;
        let dy = (y as f32 + 0.5) / h - 0.5;
        let d = (dx * dx + dy * dy).sqrt() / norm;
        let factor = 1.0 - amount * smoothstep(radius - softness, radius, d);
        rgb.map(|c| c * factor)
    });
    Ok(())
}

pub fn vintage(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let intensity = params.number("intensity", 1.0, 0.0, 1.0)? as f32;
    let mix = intensity * blend;
    if negligible(mix) {
        return Ok(());
    }
    map_rgb(frame, mix, |_, _, rgb| {
        let y = luma(rgb);
        let [r, g, b] = rgb.map(|c| {
            let muted = y + (c - y) * 0.65;
            0.08 + muted * 0.84
        });
        [r + 0.04, g + 0.01, b - 0.04]
    });
    Ok(())
}

/// S-curve, warm shift, then seeded grain, all scaled by `intensity`.
pub fn film_look(
    frame: &mut FrameBuffer,
    params: &Params<'_>,
    blend: f32,
    frame_index: u64,
) -> EffectResult {
    let intensity = params.number("intensity", 1.0, 0.0, 1.0)? as f32;
    let seed = params
        .optional_number("seed", 0.0, u32::MAX as f64)?
        .map(|s| s as u64)
        .unwrap_or(FILM_LOOK_SEED);
    let mix = intensity * blend;
    if negligible(mix) {
        return Ok(());
    }

    map_rgb(frame, blend, |_, _, rgb| {
        let [r, g, b] = rgb.map(|c| s_curve(c, 0.6 * intensity));
        [r + 0.03 * intensity, g, b - 0.03 * intensity]
    });
    let mut rng = grain_rng(seed, frame_index);
    add_grain(frame, 0.08 * intensity, true, &mut rng, blend);
    Ok(())
}

fn add_grain(frame: &mut FrameBuffer, amount: f32, monochrome: bool, rng: &mut StdRng, blend: f32) {
    let scale = amount * GRAIN_SCALE;
    map_rgb(frame, blend, |_, _, rgb| {
        if monochrome {
            let n = rng.gen_range(-1.0f32..=1.0) * scale;
            rgb.map(|c| c + n)
        } else {
            let mut out = rgb;
            for c in out.iter_mut() {
                *c += rng.gen_range(-1.0f32..=1.0) * scale;
            }
            out
        }
    });
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_project_model::{Effect, EffectKind};

    fn grey(w: u32, h: u32) -> FrameBuffer {
        FrameBuffer::solid(w, h, [128, 128, 128, 255])
    }

    #[test]
    fn test_seeded_grain_is_repeatable_per_frame() {
        let effect = Effect::new(EffectKind::Grain)
            .with_param("amount", 0.8)
            .with_param("seed", 42.0);
        let params = Params::new(&effect);

        let mut a = grey(8, 8);
        let mut b = grey(8, 8);
        let mut c = grey(8, 8);
        grain(&mut a, &params, 1.0, 7).unwrap();
        grain(&mut b, &params, 1.0, 7).unwrap();
        grain(&mut c, &params, 1.0, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, grey(8, 8));
    }

    #[test]
    fn test_unseeded_grain_is_stable_per_effect() {
        let effect = Effect::new(EffectKind::Grain).with_param("amount", 0.6);
        let params = Params::new(&effect);
        let mut a = grey(8, 8);
        let mut b = grey(8, 8);
        grain(&mut a, &params, 1.0, 12).unwrap();
        grain(&mut b, &params, 1.0, 12).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, grey(8, 8));

        let other = Effect::new(EffectKind::Grain).with_param("amount", 0.6);
        let mut c = grey(8, 8);
        grain(&mut c, &Params::new(&other), 1.0, 12).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_monochrome_grain_keeps_pixels_grey() {
        let effect = Effect::new(EffectKind::Grain)
            .with_param("amount", 1.0)
            .with_param("seed", 1.0)
            .with_param("monochrome", 1.0);
        let mut frame = grey(4, 4);
        grain(&mut frame, &Params::new(&effect), 1.0, 0).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                let px = frame.pixel(x, y);
                assert_eq!(px[0], px[1]);
                assert_eq!(px[1], px[2]);
                assert_eq!(px[3], 255);
            }
        }
    }

    #[test]
    fn test_vignette_darkens_corners_only() {
        let effect = Effect::new(EffectKind::Vignette).with_param("amount", 1.0);
        let mut frame = grey(21, 21);
        vignette(&mut frame, &Params::new(&effect), 1.0).unwrap();
        assert_eq!(frame.pixel(10, 10), [128, 128, 128, 255]);
        assert!(frame.pixel(0, 0)[0] < 40);
    }

    #[test]
    fn test_vintage_lifts_blacks() {
        let effect = Effect::new(EffectKind::Vintage);
        let mut frame = FrameBuffer::solid(2, 2, [0, 0, 0, 255]);
        vintage(&mut frame, &Params::new(&effect), 1.0).unwrap();
        let px = frame.pixel(0, 0);
        assert!(px[0] > 20);
        assert!(px[0] > px[2]);
    }

    #[test]
    fn test_film_look_is_deterministic_without_seed() {
        let effect = Effect::new(EffectKind::FilmLook);
        let params = Params::new(&effect);
        let mut a = grey(6, 6);
        let mut b = grey(6, 6);
        film_look(&mut a, &params, 1.0, 3).unwrap();
        film_look(&mut b, &params, 1.0, 3).unwrap();
        assert_eq!(a, b);

        let off = Effect::new(EffectKind::FilmLook).with_param("intensity", 0.0);
        let mut c = grey(6, 6);
        film_look(&mut c, &Params::new(&off), 1.0, 3).unwrap();
        assert_eq!(c, grey(6, 6));
    }
}
