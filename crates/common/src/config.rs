//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory where projects are stored.
    pub projects_dir: PathBuf,

    /// Media asset cache sizing.
    pub cache: CacheConfig,

    /// Live preview defaults.
    pub playback: PlaybackDefaults,

    /// Export job defaults.
    pub export: ExportDefaults,

    /// Undo/redo retention.
    pub history: HistoryConfig,

    /// Magnetic snapping defaults.
    pub snap: SnapDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Media asset cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of decoded-frame slots kept in the LRU.
    pub frame_slots: usize,

    /// Directory for generated thumbnails.
    pub thumbnail_dir: Option<PathBuf>,

    /// Default thumbnail count requested per asset.
    pub thumbnails_per_asset: usize,
}

/// Live preview defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    /// Master output volume [0.0, 1.0].
    pub master_volume: f32,

    /// Longest time a tick may wait on a cache miss, in milliseconds.
    /// `0` means one frame at the sequence frame rate.
    pub frame_budget_ms: u64,
}

/// Export job defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Minimum interval between progress reports.
    pub progress_interval_ms: u64,

    /// Maximum silence between progress reports while a frame is encoding.
    pub heartbeat_ms: u64,
}

/// Undo/redo retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries kept per direction before the oldest is pruned.
    pub max_entries: usize,
}

/// Magnetic snapping defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapDefaults {
    /// Snap threshold in seconds.
    pub threshold_secs: f64,

    /// Grid interval in seconds (`None` disables grid snapping).
    pub grid_secs: Option<f64>,

    /// Only snap to downbeats when beat markers are available.
    pub downbeats_only: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter. A bare level ("info", "debug") applies to the Cutline
    /// crates with everything else at warn; full directives such as
    /// "cutline_render_engine=trace,warn" are used as written.
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Whether to print the event target.
    pub with_target: bool,

    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            projects_dir: dirs_default_projects(),
            cache: CacheConfig::default(),
            playback: PlaybackDefaults::default(),
            export: ExportDefaults::default(),
            history: HistoryConfig::default(),
            snap: SnapDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            frame_slots: 10,
            thumbnail_dir: None,
            thumbnails_per_asset: 8,
        }
    }
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            frame_budget_ms: 0,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            progress_interval_ms: 250,
            heartbeat_ms: 1000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 32 }
    }
}

impl Default for SnapDefaults {
    fn default() -> Self {
        Self {
            threshold_secs: 0.1,
            grid_secs: None,
            downbeats_only: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
            file: None,
        }
    }
}

impl EngineConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("cutline").join("config.json")
}

/// Default projects directory.
fn dirs_default_projects() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("cutline").join("projects")
}
