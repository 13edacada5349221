//! Per-clip effects pipeline.
//!
//! Effects run on CPU over RGBA8 frames, in the order they appear on the
//! clip. Every effect reads its parameters through [`Params`], which clamps
//! to the documented range and rejects malformed values before any pixel is
//! touched. Alpha is never written.
//!
//! A failing effect is logged and skipped; the rest of the chain still runs.

pub mod blur;
pub mod color;
pub mod hsl;
pub mod lut;
pub mod stylize;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use cutline_common::{CutlineError, CutlineResult};
use cutline_project_model::{Clip, Effect, EffectKind, FrameBuffer};

pub use lut::Lut3d;

/// Blend values below this are treated as "no change".
pub const MIN_BLEND: f64 = 1.0 / 512.0;

/// Why an effect could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum EffectApplyError {
    #[error("{kind:?}: invalid parameter '{param}': {message}")]
    InvalidParam {
        kind: EffectKind,
        param: String,
        message: String,
    },

    #[error("LUT '{name}' is not registered")]
    UnknownLut { name: String },

    #[error("custom effect '{name}' is not registered")]
    UnknownCustom { name: String },

    #[error("custom effect '{name}' failed: {message}")]
    CustomFailed { name: String, message: String },

    #[error("custom effect '{name}' panicked")]
    CustomPanicked { name: String },

    #[error("LUT parse error at line {line}: {message}")]
    LutParse { line: usize, message: String },
}

impl From<EffectApplyError> for CutlineError {
    fn from(err: EffectApplyError) -> Self {
        CutlineError::effect_apply(err.to_string())
    }
}

/// User-supplied effect, referenced from a clip by `name`.
///
/// Implementations get a scratch copy of the frame; the result is only
/// blended back if they return `Ok` and keep the frame size.
pub trait CustomEffect: Send + Sync {
    fn apply(&self, frame: &mut FrameBuffer, effect: &Effect, frame_index: u64) -> CutlineResult<()>;
}

/// Counts from one pass over a clip's effect list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectsOutcome {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Applies clip effects, with registries for LUTs and custom effects.
#[derive(Default)]
pub struct EffectsPipeline {
    luts: HashMap<String, Arc<Lut3d>>,
    customs: HashMap<String, Arc<dyn CustomEffect>>,
}

impl std::fmt::Debug for EffectsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectsPipeline")
            .field("luts", &self.luts.keys().collect::<Vec<_>>())
            .field("customs", &self.customs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EffectsPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_lut(&mut self, name: impl Into<String>, lut: Lut3d) {
        self.luts.insert(name.into(), Arc::new(lut));
    }

    pub fn register_custom(&mut self, name: impl Into<String>, effect: Arc<dyn CustomEffect>) {
        self.customs.insert(name.into(), effect);
    }

    pub fn has_lut(&self, name: &str) -> bool {
        self.luts.contains_key(name)
    }

    /// Run every enabled effect of `clip` over `frame`.
    pub fn apply_clip_effects(
        &self,
        frame: &mut FrameBuffer,
        clip: &Clip,
        frame_index: u64,
    ) -> EffectsOutcome {
        let mut outcome = EffectsOutcome::default();
        for effect in &clip.effects {
            if !effect.enabled || effect.blend <= 0.0 {
                outcome.skipped += 1;
                continue;
            }
            match self.apply_effect(frame, effect, frame_index) {
                Ok(()) => outcome.applied += 1,
                Err(e) => {
                    tracing::warn!(
                        clip_id = %clip.id,
                        effect_id = %effect.id,
                        kind = ?effect.kind,
                        error = %e,
                        "Effect failed, continuing without it"
                    );
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// Apply a single effect. Disabled state is not checked here.
    pub fn apply_effect(
        &self,
        frame: &mut FrameBuffer,
        effect: &Effect,
        frame_index: u64,
    ) -> Result<(), EffectApplyError> {
        let params = Params::new(effect);
        let blend = effect.blend.clamp(0.0, 1.0) as f32;
        match effect.kind {
            EffectKind::Brightness => color::brightness(frame, &params, blend),
            EffectKind::Contrast => color::contrast(frame, &params, blend),
            EffectKind::Saturation => color::saturation(frame, &params, blend),
            EffectKind::Hue => color::hue(frame, &params, blend),
            EffectKind::BlackAndWhite => color::black_and_white(frame, &params, blend),
            EffectKind::Sepia => color::sepia(frame, &params, blend),
            EffectKind::CrossProcess => color::cross_process(frame, &params, blend),
            EffectKind::Temperature => color::temperature(frame, &params, blend),
            EffectKind::Tint => color::tint(frame, &params, blend),
            EffectKind::ColorGrade => color::color_grade(frame, &params, blend),
            EffectKind::Blur => blur::blur(frame, &params, blend),
            EffectKind::Sharpen => blur::sharpen(frame, &params, blend),
            EffectKind::Grain => stylize::grain(frame, &params, blend, frame_index),
            EffectKind::Vintage => stylize::vintage(frame, &params, blend),
            EffectKind::Vignette => stylize::vignette(frame, &params, blend),
            EffectKind::FilmLook => stylize::film_look(frame, &params, blend, frame_index),
            EffectKind::Lut => {
                let name = params.text("name")?;
                let lut = self
                    .luts
                    .get(name)
                    .ok_or_else(|| EffectApplyError::UnknownLut {
                        name: name.to_string(),
                    })?;
                lut::apply(frame, lut, &params, blend)
            }
            EffectKind::Custom => self.apply_custom(frame, effect, &params, blend, frame_index),
        }
    }

    fn apply_custom(
        &self,
        frame: &mut FrameBuffer,
        effect: &Effect,
        params: &Params<'_>,
        blend: f32,
        frame_index: u64,
    ) -> Result<(), EffectApplyError> {
        let name = params.text("name")?;
        let custom = self
            .customs
            .get(name)
            .ok_or_else(|| EffectApplyError::UnknownCustom {
                name: name.to_string(),
            })?;
        if negligible(blend) {
            return Ok(());
        }

        let mut scratch = frame.clone();
        let result = catch_unwind(AssertUnwindSafe(|| {
            custom.apply(&mut scratch, effect, frame_index)
        }));
        match result {
            Err(_) => Err(EffectApplyError::CustomPanicked {
                name: name.to_string(),
            }),
            Ok(Err(e)) => Err(EffectApplyError::CustomFailed {
                name: name.to_string(),
                message: e.to_string(),
            }),
            Ok(Ok(())) => {
                if scratch.width() != frame.width() || scratch.height() != frame.height() {
                    return Err(EffectApplyError::CustomFailed {
                        name: name.to_string(),
                        message: format!(
                            "frame resized from {}x{} to {}x{}",
                            frame.width(),
                            frame.height(),
                            scratch.width(),
                            scratch.height()
                        ),
                    });
                }
                mix_from(frame, &scratch, blend);
                Ok(())
            }
        }
    }
}

/// Validated, range-clamped access to an effect's parameters.
pub struct Params<'a> {
    effect: &'a Effect,
}

impl<'a> Params<'a> {
    pub fn new(effect: &'a Effect) -> Self {
        Self { effect }
    }

    pub fn effect_id(&self) -> &str {
        &self.effect.id
    }

    /// Number in `[min, max]`, or `default` when absent.
    pub fn number(&self, key: &str, default: f64, min: f64, max: f64) -> Result<f64, EffectApplyError> {
        if !self.effect.params.contains_key(key) {
            return Ok(default.clamp(min, max));
        }
        self.effect
            .number(key)
            .map(|v| v.clamp(min, max))
            .ok_or_else(|| self.invalid(key, "expected a finite number"))
    }

    /// Number present only if the key is set.
    pub fn optional_number(&self, key: &str, min: f64, max: f64) -> Result<Option<f64>, EffectApplyError> {
        if !self.effect.params.contains_key(key) {
            return Ok(None);
        }
        self.number(key, min, min, max).map(Some)
    }

    /// 0/1 flag.
    pub fn flag(&self, key: &str, default: bool) -> Result<bool, EffectApplyError> {
        let fallback = if default { 1.0 } else { 0.0 };
        Ok(self.number(key, fallback, 0.0, 1.0)? >= 0.5)
    }

    pub fn text(&self, key: &str) -> Result<&'a str, EffectApplyError> {
        self.effect
            .text(key)
            .ok_or_else(|| self.invalid(key, "expected a name"))
    }

    pub fn kind(&self) -> EffectKind {
        self.effect.kind
    }

    fn invalid(&self, key: &str, message: &str) -> EffectApplyError {
        EffectApplyError::InvalidParam {
            kind: self.effect.kind,
            param: key.to_string(),
            message: message.to_string(),
        }
    }
}

pub(crate) fn negligible(blend: f32) -> bool {
    (blend as f64) < MIN_BLEND
}

pub(crate) fn to_unit(v: u8) -> f32 {
    v as f32 / 255.0
}

pub(crate) fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Rec. 709 luma.
pub(crate) fn luma([r, g, b]: [f32; 3]) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

/// Map every pixel's RGB through `f` and mix the result in by `blend`.
pub(crate) fn map_rgb<F>(frame: &mut FrameBuffer, blend: f32, mut f: F)
where
    F: FnMut(u32, u32, [f32; 3]) -> [f32; 3],
{
    let width = frame.width().max(1);
    for (i, px) in frame.data_mut().chunks_exact_mut(4).enumerate() {
        let x = i as u32 % width;
        let y = i as u32 / width;
        let src = [to_unit(px[0]), to_unit(px[1]), to_unit(px[2])];
        let out = f(x, y, src);
        for c in 0..3 {
            px[c] = to_byte(src[c] + (out[c] - src[c]) * blend);
        }
    }
}

/// Mix `processed` into `frame` by `blend`, RGB only.
pub(crate) fn mix_from(frame: &mut FrameBuffer, processed: &FrameBuffer, blend: f32) {
    for (dst, src) in frame
        .data_mut()
        .chunks_exact_mut(4)
        .zip(processed.data().chunks_exact(4))
    {
        for c in 0..3 {
            let a = to_unit(dst[c]);
            let b = to_unit(src[c]);
            dst[c] = to_byte(a + (b - a) * blend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_project_model::ClipKind;

    fn clip_with(effects: Vec<Effect>) -> Clip {
        let mut clip = Clip::new("a", ClipKind::Video, 0.0, 0.0, 1.0);
        clip.effects = effects;
        clip
    }

    struct Invert;

    impl CustomEffect for Invert {
        fn apply(&self, frame: &mut FrameBuffer, _: &Effect, _: u64) -> CutlineResult<()> {
            for px in frame.data_mut().chunks_exact_mut(4) {
                for c in 0..4 {
                    px[c] = 255 - px[c];
                }
            }
            Ok(())
        }
    }

    struct Explodes;

    impl CustomEffect for Explodes {
        fn apply(&self, frame: &mut FrameBuffer, _: &Effect, _: u64) -> CutlineResult<()> {
            frame.data_mut()[0] = 0;
            panic!("boom");
        }
    }

    struct Refuses;

    impl CustomEffect for Refuses {
        fn apply(&self, frame: &mut FrameBuffer, _: &Effect, _: u64) -> CutlineResult<()> {
            frame.data_mut().fill(0);
            Err(CutlineError::effect_apply("not today"))
        }
    }

    #[test]
    fn test_disabled_and_zero_blend_are_skipped() {
        let mut disabled = Effect::new(EffectKind::Brightness).with_param("value", 0.5);
        disabled.enabled = false;
        let zero = Effect::new(EffectKind::Brightness)
            .with_param("value", 0.5)
            .with_blend(0.0);
        let clip = clip_with(vec![disabled, zero]);

        let original = FrameBuffer::solid(4, 4, [100, 100, 100, 255]);
        let mut frame = original.clone();
        let outcome = EffectsPipeline::new().apply_clip_effects(&mut frame, &clip, 0);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(frame, original);
    }

    #[test]
    fn test_failure_does_not_stop_the_chain() {
        let bad = Effect::new(EffectKind::Brightness).with_param("value", "bright");
        let good = Effect::new(EffectKind::Brightness).with_param("value", 0.2);
        let clip = clip_with(vec![bad, good]);

        let mut frame = FrameBuffer::solid(2, 2, [100, 100, 100, 255]);
        let outcome = EffectsPipeline::new().apply_clip_effects(&mut frame, &clip, 0);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.applied, 1);
        assert!(frame.pixel(0, 0)[0] > 100);
    }

    #[test]
    fn test_unknown_lut_is_an_error() {
        let effect = Effect::new(EffectKind::Lut).with_param("name", "teal-orange");
        let mut frame = FrameBuffer::solid(2, 2, [10, 20, 30, 255]);
        let err = EffectsPipeline::new()
            .apply_effect(&mut frame, &effect, 0)
            .unwrap_err();
        assert!(matches!(err, EffectApplyError::UnknownLut { .. }));
    }

    #[test]
    fn test_custom_effect_blends_rgb_only() {
        let mut pipeline = EffectsPipeline::new();
        pipeline.register_custom("invert", Arc::new(Invert));
        let effect = Effect::new(EffectKind::Custom).with_param("name", "invert");

        let mut frame = FrameBuffer::solid(2, 2, [0, 100, 255, 200]);
        pipeline.apply_effect(&mut frame, &effect, 0).unwrap();
        assert_eq!(frame.pixel(1, 1), [255, 155, 0, 200]);
    }

    #[test]
    fn test_custom_panic_leaves_frame_untouched() {
        let mut pipeline = EffectsPipeline::new();
        pipeline.register_custom("explodes", Arc::new(Explodes));
        pipeline.register_custom("refuses", Arc::new(Refuses));

        let original = FrameBuffer::solid(2, 2, [50, 60, 70, 255]);
        let mut frame = original.clone();

        let panicked = Effect::new(EffectKind::Custom).with_param("name", "explodes");
        let err = pipeline.apply_effect(&mut frame, &panicked, 0).unwrap_err();
        assert!(matches!(err, EffectApplyError::CustomPanicked { .. }));
        assert_eq!(frame, original);

        let failed = Effect::new(EffectKind::Custom).with_param("name", "refuses");
        let err = pipeline.apply_effect(&mut frame, &failed, 0).unwrap_err();
        assert!(matches!(err, EffectApplyError::CustomFailed { .. }));
        assert_eq!(frame, original);
    }

    #[test]
    fn test_params_clamp_and_validate() {
        let effect = Effect::new(EffectKind::Blur)
            .with_param("radius", 500.0)
            .with_param("label", "x");
        let params = Params::new(&effect);
        assert_eq!(params.number("radius", 0.0, 0.0, 64.0).unwrap(), 64.0);
        assert_eq!(params.number("missing", 3.0, 0.0, 64.0).unwrap(), 3.0);
        assert!(params.number("label", 0.0, 0.0, 1.0).is_err());
        assert!(params.text("radius").is_err());
        assert_eq!(params.optional_number("missing", 0.0, 1.0).unwrap(), None);
    }

    #[test]
    fn test_error_converts_to_shared_error() {
        let err: CutlineError = EffectApplyError::UnknownCustom {
            name: "glitch".into(),
        }
        .into();
        assert!(matches!(err, CutlineError::EffectApply { .. }));
        assert!(!err.is_user_terminal());
    }
}
