//! Neighborhood effects: blur and unsharp-mask sharpen.

use cutline_project_model::FrameBuffer;

use super::{negligible, to_byte, to_unit, EffectApplyError, Params};

type EffectResult = Result<(), EffectApplyError>;

/// Box passes per axis; three boxes approximate a Gaussian closely enough.
const BLUR_PASSES: usize = 3;

pub fn blur(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let radius = params.number("radius", 0.0, 0.0, 64.0)?;
    // Each box pass covers a third of the requested radius.
    let pass_radius = (radius / BLUR_PASSES as f64).round() as usize;
    if radius < 0.5 || negligible(blend) || frame.is_empty() {
        return Ok(());
    }

    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let mut plane = rgb_plane(frame);
    for _ in 0..BLUR_PASSES {
        plane = box_blur(&plane, w, h, pass_radius.max(1));
    }
    write_plane(frame, &plane, blend);
    Ok(())
}

pub fn sharpen(frame: &mut FrameBuffer, params: &Params<'_>, blend: f32) -> EffectResult {
    let amount = params.number("amount", 0.0, 0.0, 5.0)? as f32;
    if amount == 0.0 || negligible(blend) || frame.is_empty() {
        return Ok(());
    }

    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let original = rgb_plane(frame);
    let soft = box_blur(&original, w, h, 1);
    let sharpened: Vec<[f32; 3]> = original
        .iter()
        .zip(soft.iter())
        .map(|(o, s)| {
            [
                o[0] + amount * (o[0] - s[0]),
                o[1] + amount * (o[1] - s[1]),
                o[2] + amount * (o[2] - s[2]),
            ]
        })
        .collect();
    write_plane(frame, &sharpened, blend);
    Ok(())
}

fn rgb_plane(frame: &FrameBuffer) -> Vec<[f32; 3]> {
    frame
        .data()
        .chunks_exact(4)
        .map(|px| [to_unit(px[0]), to_unit(px[1]), to_unit(px[2])])
        .collect()
}

fn write_plane(frame: &mut FrameBuffer, plane: &[[f32; 3]], blend: f32) {
    for (px, out) in frame.data_mut().chunks_exact_mut(4).zip(plane.iter()) {
        for c in 0..3 {
            let src = to_unit(px[c]);
            px[c] = to_byte(src + (out[c] - src) * blend);
        }
    }
}

/// Separable box blur with clamped edges.
fn box_blur(plane: &[[f32; 3]], w: usize, h: usize, radius: usize) -> Vec<[f32; 3]> {
    let horizontal = blur_axis(plane, w, h, radius, true);
    blur_axis(&horizontal, w, h, radius, false)
}

fn blur_axis(
    plane: &[[f32; 3]],
    w: usize,
    h: usize,
    radius: usize,
    horizontal: bool,
) -> Vec<[f32; 3]> {
    let mut out = vec![[0.0f32; 3]; plane.len()];
    let (lines, len) = if horizontal { (h, w) } else { (w, h) };
    let index = |line: usize, pos: usize| {
        if horizontal {
            line * w + pos
        } else {
            pos * w + line
        }
    };
    let window = (2 * radius + 1) as f32;

    for line in 0..lines {
        let at = |pos: isize| -> [f32; 3] {
            let clamped = pos.clamp(0, len as isize - 1) as usize;
            plane[index(line, clamped)]
        };
        let mut sum = [0.0f32; 3];
        for k in -(radius as isize)..=(radius as isize) {
            let v = at(k);
            for c in 0..3 {
                sum[c] += v[c];
            }
        }
        for pos in 0..len {
            out[index(line, pos)] = [sum[0] / window, sum[1] / window, sum[2] / window];
            let leaving = at(pos as isize - radius as isize);
            let entering = at(pos as isize + radius as isize + 1);
            for c in 0..3 {
                sum[c] += entering[c] - leaving[c];
            }
        }
    }
    out
}
