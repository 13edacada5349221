//! Beat markers produced by audio analysis.

use serde::{Deserialize, Serialize};

/// A detected beat in an audio-bearing asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatMarker {
    /// Seconds from the start of the source media.
    pub time: f64,

    /// Relative onset strength [0.0, 1.0].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,

    /// Whether this beat opens a measure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_downbeat: Option<bool>,
}

impl BeatMarker {
    pub fn new(time: f64) -> Self {
        Self {
            time,
            strength: None,
            is_downbeat: None,
        }
    }

    pub fn downbeat(time: f64) -> Self {
        Self {
            time,
            strength: None,
            is_downbeat: Some(true),
        }
    }

    pub fn is_downbeat(&self) -> bool {
        self.is_downbeat.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let json = serde_json::to_string(&BeatMarker::new(1.5)).unwrap();
        assert_eq!(json, r#"{"time":1.5}"#);

        let parsed: BeatMarker =
            serde_json::from_str(r#"{"time":2.0,"isDownbeat":true,"strength":0.8}"#).unwrap();
        assert!(parsed.is_downbeat());
        assert_eq!(parsed.strength, Some(0.8));
    }
}
