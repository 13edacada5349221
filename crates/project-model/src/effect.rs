//! Per-clip effect descriptors.
//!
//! The model only stores what an effect is and its parameters; the pixel
//! transforms live in the processing crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Effect type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    Brightness,
    Contrast,
    Saturation,
    Blur,
    Hue,
    Sharpen,
    BlackAndWhite,
    Sepia,
    CrossProcess,
    Temperature,
    Tint,
    Lut,
    Grain,
    ColorGrade,
    Vintage,
    Vignette,
    FilmLook,
    Custom,
}

/// An effect parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

/// An effect applied to a clip. List order on the clip is compositing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: EffectKind,

    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Mix between the original and the processed pixel [0.0, 1.0].
    #[serde(default = "default_blend")]
    pub blend: f64,
}

fn default_true() -> bool {
    true
}

fn default_blend() -> f64 {
    1.0
}

impl Effect {
    /// Create an enabled effect at full blend with no parameters.
    pub fn new(kind: EffectKind) -> Self {
        Self {
            id: crate::new_id(),
            kind,
            params: BTreeMap::new(),
            enabled: true,
            blend: 1.0,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_blend(mut self, blend: f64) -> Self {
        self.blend = blend;
        self
    }

    /// Numeric parameter (numbers given as text are parsed).
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.params.get(key)? {
            ParamValue::Number(n) if n.is_finite() => Some(*n),
            ParamValue::Number(_) => None,
            ParamValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.params.get(key)? {
            ParamValue::Text(s) => Some(s.as_str()),
            ParamValue::Number(_) => None,
        }
    }
}
