//! Per-pixel color adjustments.

use cutline_project_model::FrameBuffer;

use super::hsl::{hsl_to_rgb, rgb_to_hsl, wrap_hue};
use super::{luma, map_rgb, negligible, EffectApplyError, Params};

type EffectResult = Result<(), EffectApplyError>;

/// Shift added per channel at `value = ±1` for temperature and tint.
const WHITE_BALANCE_SHIFT: f32 = 0.15;

pub fn brightness(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let value = params.number("value", 0.0, -1.0, 1.0)? as f32;
    if value == 0.0 || negligible(blend) {
        return Ok(());
    }
    map_rgb(frame, blend, |_, _, rgb| rgb.map(|c| c + value));
    Ok(())
}

pub fn contrast(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let value = params.number("value", 0.0, -1.0, 1.0)? as f32;
    if value == 0.0 || negligible(blend) {
        return Ok(());
    }
    // -1 flattens to mid grey, +1 doubles the slope around it.
    let factor = 1.0 + value;
    map_rgb(frame, blend, |_, _, rgb| rgb.map(|c| (c - 0.5) * factor + 0.5));
    Ok(())
}

pub fn saturation(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let value = params.number("value", 0.0, -1.0, 1.0)? as f32;
    if value == 0.0 || negligible(blend) {
        return Ok(());
    }
    let factor = 1.0 + value;
    map_rgb(frame, blend, |_, _, rgb| {
        let y = luma(rgb);
        rgb.map(|c| y + (c - y) * factor)
    });
    Ok(())
}

pub fn hue(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let degrees = params.number("degrees", 0.0, -180.0, 180.0)? as f32;
    if degrees == 0.0 || negligible(blend) {
        return Ok(());
    }
    let turn = degrees / 360.0;
    map_rgb(frame, blend, |_, _, rgb| {
        let [h, s, l] = rgb_to_hsl(rgb);
        hsl_to_rgb([wrap_hue(h + turn), s, l])
    });
    Ok(())
}

pub fn black_and_white(frame: &mut FrameBuffer, _params: &Params<'_>, blend: f32) -> EffectResult {
    if negligible(blend) {
        return Ok(());
    }
    map_rgb(frame, blend, |_, _, rgb| {
        let y = luma(rgb);
        [y, y, y]
    });
    Ok(())
}

pub fn sepia(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let intensity = params.number("intensity", 1.0, 0.0, 1.0)? as f32;
    let mix = intensity * blend;
    if negligible(mix) {
        return Ok(());
    }
    // Brown hue around 35 degrees, lightness follows the original.
    map_rgb(frame, mix, |_, _, rgb| hsl_to_rgb([35.0 / 360.0, 0.35, luma(rgb)]));
    Ok(())
}

pub fn cross_process(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let intensity = params.number("intensity", 1.0, 0.0, 1.0)? as f32;
    let mix = intensity * blend;
    if negligible(mix) {
        return Ok(());
    }
    map_rgb(frame, mix, |_, _, rgb| {
        let [h, s, l] = rgb_to_hsl(rgb);
        let shifted = hsl_to_rgb([
            wrap_hue(h + 0.04),
            (s * 1.25).min(1.0),
            (l - 0.5) * 1.15 + 0.5,
        ]);
        let [r, g, b] = shifted;
        [
            s_curve(r, 0.6),
            g * 1.05 + 0.02,
            0.125 + b * 0.75,
        ]
    });
    Ok(())
}

pub fn temperature(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let value = params.number("value", 0.0, -1.0, 1.0)? as f32;
    if value == 0.0 || negligible(blend) {
        return Ok(());
    }
    let shift = value * WHITE_BALANCE_SHIFT;
    map_rgb(frame, blend, |_, _, [r, g, b]| [r + shift, g, b - shift]);
    Ok(())
}

pub fn tint(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let value = params.number("value", 0.0, -1.0, 1.0)? as f32;
    if value == 0.0 || negligible(blend) {
        return Ok(());
    }
    // Positive tint pushes toward magenta, negative toward green.
    let shift = value * WHITE_BALANCE_SHIFT;
    map_rgb(frame, blend, |_, _, [r, g, b]| {
        [r + shift * 0.5, g - shift, b + shift * 0.5]
    });
    Ok(())
}

/// Split toning: one hue into the shadows, another into the highlights.
pub fn color_grade(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let shadows_hue = params.number("shadows_hue", 200.0, 0.0, 360.0)? as f32;
    let highlights_hue = params.number("highlights_hue", 35.0, 0.0, 360.0)? as f32;
    let balance = params.number("balance", 0.0, -1.0, 1.0)? as f32;
    let strength = params.number("strength", 0.5, 0.0, 1.0)? as f32;
    if strength == 0.0 || negligible(blend) {
        return Ok(());
    }

    let shadow_tint = hsl_to_rgb([shadows_hue / 360.0, 1.0, 0.5]);
    let highlight_tint = hsl_to_rgb([highlights_hue / 360.0, 1.0, 0.5]);
    // Positive balance moves the crossover up, giving shadows more range.
    let pivot = 0.5 + balance * 0.25;

    map_rgb(frame, blend, |_, _, rgb| {
        let [_, _, l] = rgb_to_hsl(rgb);
        let ws = ((pivot - l) / pivot).clamp(0.0, 1.0);
        let wh = ((l - pivot) / (1.0 - pivot)).clamp(0.0, 1.0);
        let mut out = rgb;
        for c in 0..3 {
            let toned = (shadow_tint[c] - 0.5) * ws + (highlight_tint[c] - 0.5) * wh;
            out[c] = rgb[c] + toned * strength * 0.5;
        }
        out
    });
    Ok(())
}

/// Smoothstep-based contrast curve; `amount = 0` is the identity.
pub(crate) fn s_curve(c: f32, amount: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    let smooth = c * c * (3.0 - 2.0 * c);
    c + (smooth - c) * amount
}
