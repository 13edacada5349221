//! Error types shared across Cutline crates.
//!
//! The variants follow the engine's recovery policy: validation, decode,
//! probe, and effect failures are handled close to where they happen;
//! surface, export, and persistence failures reach the caller.

use std::path::PathBuf;

/// Top-level error type for Cutline operations.
#[derive(Debug, thiserror::Error)]
pub enum CutlineError {
    /// A rejected edit. The caller re-issues a corrected edit.
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Effect error: {message}")]
    EffectApply { message: String },

    /// Play/attach was requested without a usable render target.
    #[error("Render surface unavailable: {message}")]
    SurfaceUnavailable { message: String },

    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    #[error("Export cancelled")]
    ExportCancelled,

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CutlineError.
pub type CutlineResult<T> = Result<T, CutlineError>;

impl CutlineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn effect_apply(msg: impl Into<String>) -> Self {
        Self::EffectApply {
            message: msg.into(),
        }
    }

    pub fn surface_unavailable(msg: impl Into<String>) -> Self {
        Self::SurfaceUnavailable {
            message: msg.into(),
        }
    }

    pub fn export_failed(msg: impl Into<String>) -> Self {
        Self::ExportFailed {
            message: msg.into(),
        }
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether the error should be shown to the end user as a terminal failure.
    ///
    /// Everything else degrades locally (placeholder frame, skipped effect,
    /// rejected edit).
    pub fn is_user_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExportFailed { .. } | Self::ExportCancelled | Self::Persistence { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CutlineError::validation("clip overlaps");
        assert_eq!(err.to_string(), "Validation error: clip overlaps");

        let err = CutlineError::surface_unavailable("not attached");
        assert!(err.to_string().contains("not attached"));
    }

    #[test]
    fn test_terminal_classification() {
        assert!(CutlineError::export_failed("encoder died").is_user_terminal());
        assert!(CutlineError::persistence("disk full").is_user_terminal());
        assert!(!CutlineError::decode("bad packet").is_user_terminal());
        assert!(!CutlineError::validation("overlap").is_user_terminal());
    }
}
