//! 3D color lookup tables in the `.cube` format.

use std::path::Path;
use std::str::SplitWhitespace;

use cutline_common::{CutlineError, CutlineResult};
use cutline_project_model::FrameBuffer;

use super::{map_rgb, negligible, EffectApplyError, Params};

const MAX_LUT_SIZE: usize = 256;

/// A cubic RGB lattice. Entries are stored red-fastest, as in `.cube` files.
#[derive(Debug, Clone, PartialEq)]
pub struct Lut3d {
    size: usize,
    domain_min: [f32; 3],
    domain_max: [f32; 3],
    table: Vec<[f32; 3]>,
}

impl Lut3d {
    /// Lattice that maps every color to itself.
    pub fn identity(size: usize) -> Self {
        let size = size.clamp(2, MAX_LUT_SIZE);
        let step = 1.0 / (size - 1) as f32;
        let mut table = Vec::with_capacity(size * size * size);
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    table.push([r as f32 * step, g as f32 * step, b as f32 * step]);
                }
            }
        }
        Self {
            size,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            table,
        }
    }

    /// Build from a lattice of `size³` entries, red varying fastest.
    pub fn from_table(size: usize, table: Vec<[f32; 3]>) -> Result<Self, EffectApplyError> {
        if !(2..=MAX_LUT_SIZE).contains(&size) {
            return Err(EffectApplyError::LutParse {
                line: 0,
                message: format!("unsupported LUT size {size}"),
            });
        }
        if table.len() != size * size * size {
            return Err(EffectApplyError::LutParse {
                line: 0,
                message: format!("expected {} entries, found {}", size * size * size, table.len()),
            });
        }
        Ok(Self {
            size,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            table,
        })
    }

    /// Parse `.cube` text (`LUT_3D_SIZE`, optional `DOMAIN_MIN`/`DOMAIN_MAX`).
    pub fn parse_cube(text: &str) -> Result<Self, EffectApplyError> {
        let mut size = None;
        let mut domain_min = [0.0f32; 3];
        let mut domain_max = [1.0f32; 3];
        let mut table = Vec::new();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(head) = parts.next() else { continue };
            match head {
                "TITLE" | "LUT_1D_INPUT_RANGE" | "LUT_3D_INPUT_RANGE" => continue,
                "LUT_1D_SIZE" => {
                    return Err(EffectApplyError::LutParse {
                        line: line_no,
                        message: "1D LUTs are not supported".into(),
                    })
                }
                "LUT_3D_SIZE" => {
                    let n = parts
                        .next()
                        .and_then(|v| v.parse::<usize>().ok())
                        .ok_or_else(|| EffectApplyError::LutParse {
                            line: line_no,
                            message: "LUT_3D_SIZE needs an integer".into(),
                        })?;
                    size = Some(n);
                }
                "DOMAIN_MIN" => domain_min = parse_n::<3>(&mut parts, line_no)?,
                "DOMAIN_MAX" => domain_max = parse_n::<3>(&mut parts, line_no)?,
                _ => {
                    let first = head.parse::<f32>().map_err(|_| EffectApplyError::LutParse {
                        line: line_no,
                        message: format!("unknown keyword '{head}'"),
                    })?;
                    let [g, b] = parse_n::<2>(&mut parts, line_no)?;
                    table.push([first, g, b]);
                }
            }
        }

        let size = size.ok_or(EffectApplyError::LutParse {
            line: 0,
            message: "missing LUT_3D_SIZE".into(),
        })?;
        let mut lut = Self::from_table(size, table)?;
        for c in 0..3 {
            if domain_max[c] <= domain_min[c] {
                return Err(EffectApplyError::LutParse {
                    line: 0,
                    message: "DOMAIN_MAX must exceed DOMAIN_MIN".into(),
                });
            }
        }
        lut.domain_min = domain_min;
        lut.domain_max = domain_max;
        Ok(lut)
    }

    pub fn from_file(path: &Path) -> CutlineResult<Self> {
        if !path.exists() {
            return Err(CutlineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse_cube(&text)?)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Trilinear lookup of a normalized RGB color.
    pub fn sample(&self, rgb: [f32; 3]) -> [f32; 3] {
        let max_index = (self.size - 1) as f32;
        let mut base = [0usize; 3];
        let mut frac = [0.0f32; 3];
        for c in 0..3 {
            let span = self.domain_max[c] - self.domain_min[c];
            let t = ((rgb[c] - self.domain_min[c]) / span).clamp(0.0, 1.0) * max_index;
            let i = (t.floor() as usize).min(self.size - 2);
            base[c] = i;
            frac[c] = t - i as f32;
        }

        let mut out = [0.0f32; 3];
        for corner in 0..8usize {
            let dr = corner & 1;
            let dg = (corner >> 1) & 1;
            let db = (corner >> 2) & 1;
            let weight = axis_weight(frac[0], dr) * axis_weight(frac[1], dg) * axis_weight(frac[2], db);
            if weight == 0.0 {
                continue;
            }
            let entry = self.at(base[0] + dr, base[1] + dg, base[2] + db);
            for c in 0..3 {
                out[c] += entry[c] * weight;
            }
        }
        out
    }

    fn at(&self, r: usize, g: usize, b: usize) -> [f32; 3] {
        self.table[(b * self.size + g) * self.size + r]
    }
}

fn axis_weight(frac: f32, upper: usize) -> f32 {
    if upper == 1 {
        frac
    } else {
        1.0 - frac
    }
}

fn parse_n<const N: usize>(
    parts: &mut SplitWhitespace<'_>,
    line: usize,
) -> Result<[f32; N], EffectApplyError> {
    let mut out = [0.0f32; N];
    for slot in out.iter_mut() {
        *slot = parts
            .next()
            .and_then(|v| v.parse::<f32>().ok())
            .ok_or_else(|| EffectApplyError::LutParse {
                line,
                message: format!("expected {N} more numbers"),
            })?;
    }
    Ok(out)
}

/// Apply a registered LUT, mixed by `intensity × blend`.
pub fn apply(
    frame: &mut FrameBuffer,
    lut: &Lut3d,
    params: &Params<'_>,
    blend: f32,
) -> Result<(), EffectApplyError> {
    let intensity = params.number("intensity", 1.0, 0.0, 1.0)? as f32;
    let mix = intensity * blend;
    if negligible(mix) {
        return Ok(());
    }
    map_rgb(frame, mix, |_, _, rgb| lut.sample(rgb));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVERT_CUBE: &str = "\
# two-point inversion
TITLE \"invert\"
LUT_3D_SIZE 2
1 1 1
0 1 1
1 0 1
0 0 1
1 1 0
0 1 0
1 0 0
0 0 0
";

    #[test]
    fn test_identity_lookup() {
        let lut = Lut3d::identity(17);
        let out = lut.sample([0.3, 0.55, 0.9]);
        for (a, b) in out.iter().zip([0.3, 0.55, 0.9].iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_parse_and_interpolate() {
        let lut = Lut3d::parse_cube(INVERT_CUBE).unwrap();
        assert_eq!(lut.size(), 2);
        let out = lut.sample([0.25, 0.5, 1.0]);
        assert!((out[0] - 0.75).abs() < 1e-5);
        assert!((out[1] - 0.5).abs() < 1e-5);
        assert!(out[2].abs() < 1e-5);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = Lut3d::parse_cube("LUT_3D_SIZE 2\n0 0\n").unwrap_err();
        assert!(matches!(err, EffectApplyError::LutParse { line: 2, .. }));

        let err = Lut3d::parse_cube("0 0 0\n").unwrap_err();
        assert!(matches!(err, EffectApplyError::LutParse { line: 0, .. }));

        let err = Lut3d::parse_cube("LUT_3D_SIZE 3\n0 0 0\n").unwrap_err();
        assert!(matches!(err, EffectApplyError::LutParse { .. }));
    }

    #[test]
    fn test_apply_respects_intensity() {
        let lut = Lut3d::parse_cube(INVERT_CUBE).unwrap();
        let effect = cutline_project_model::Effect::new(cutline_project_model::EffectKind::Lut)
            .with_param("name", "invert")
            .with_param("intensity", 0.0);
        let original = FrameBuffer::solid(2, 2, [10, 20, 30, 255]);
        let mut frame = original.clone();
        apply(&mut frame, &lut, &Params::new(&effect), 1.0).unwrap();
        assert_eq!(frame, original);

        let effect = effect.with_param("intensity", 1.0);
        apply(&mut frame, &lut, &Params::new(&effect), 1.0).unwrap();
        assert_eq!(frame.pixel(0, 0), [245, 235, 225, 255]);
    }
}
