//! TOML configuration for xr-bridge
//!
//! Every field carries a serde default, so a partial file (or none at all)
//! still yields a complete [`XrConfig`]. The core crate never sees this type:
//! it consumes [`DisplayConfig`] and [`SessionConfig`] built from it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xr_bridge_core::display::DisplayConfig;
use xr_bridge_core::worker::MAX_POSE_HISTORY;
use xr_bridge_core::{
    FramePacing, SessionConfig, SITTING_EYE_HEIGHT, STANDING_EYE_HEIGHT,
};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "XR_BRIDGE_CONFIG";

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XrConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub hit_test: HitTestConfig,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Metres between the floor and a seated viewer's eyes
    #[serde(default = "default_sitting_eye_height")]
    pub sitting_eye_height: f32,
    #[serde(default = "default_standing_eye_height")]
    pub standing_eye_height: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            sitting_eye_height: default_sitting_eye_height(),
            standing_eye_height: default_standing_eye_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_camera_anchor_interval_ms")]
    pub camera_anchor_interval_ms: f64,
    #[serde(default = "default_camera_anchor_cap")]
    pub camera_anchor_cap: usize,
    #[serde(default)]
    pub frame_pacing: FramePacing,
    #[serde(default = "default_pose_history_capacity")]
    pub pose_history_capacity: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            camera_anchor_interval_ms: default_camera_anchor_interval_ms(),
            camera_anchor_cap: default_camera_anchor_cap(),
            frame_pacing: FramePacing::default(),
            pose_history_capacity: default_pose_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitTestConfig {
    /// Distance along the view ray used when nothing was hit
    #[serde(default = "default_fallback_distance")]
    pub fallback_distance: f32,
}

impl Default for HitTestConfig {
    fn default() -> Self {
        Self {
            fallback_distance: default_fallback_distance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySection {
    #[serde(default = "default_field_of_view_degrees")]
    pub field_of_view_degrees: f32,
    #[serde(default = "default_aspect")]
    pub aspect: f32,
    #[serde(default = "default_depth_near")]
    pub depth_near: f32,
    #[serde(default = "default_depth_far")]
    pub depth_far: f32,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            field_of_view_degrees: default_field_of_view_degrees(),
            aspect: default_aspect(),
            depth_near: default_depth_near(),
            depth_far: default_depth_far(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_sitting_eye_height() -> f32 {
    SITTING_EYE_HEIGHT
}

fn default_standing_eye_height() -> f32 {
    STANDING_EYE_HEIGHT
}

fn default_camera_anchor_interval_ms() -> f64 {
    60_000.0
}

fn default_camera_anchor_cap() -> usize {
    10
}

fn default_pose_history_capacity() -> usize {
    120
}

fn default_fallback_distance() -> f32 {
    1.0
}

fn default_field_of_view_degrees() -> f32 {
    70.0
}

fn default_aspect() -> f32 {
    16.0 / 9.0
}

fn default_depth_near() -> f32 {
    0.1
}

fn default_depth_far() -> f32 {
    1000.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl XrConfig {
    /// Resolve the effective configuration.
    ///
    /// Looks at `XR_BRIDGE_CONFIG` first, then `config.toml` in the platform
    /// config directory, and falls back to defaults when neither exists.
    pub fn load() -> Result<Self> {
        match Self::resolve_path() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading configuration");
                Self::load_from_path(&path)
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// The file `load` would read, if any
    pub fn resolve_path() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from) {
            return Some(explicit);
        }
        Self::default_path().filter(|path| path.exists())
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "xr-bridge")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let tracking = &self.tracking;
        if !(tracking.sitting_eye_height > 0.0) || !(tracking.standing_eye_height > 0.0) {
            return Err(ConfigError::Validation(
                "eye heights must be positive".to_string(),
            ));
        }
        if self.session.camera_anchor_cap == 0 {
            return Err(ConfigError::Validation(
                "session.camera_anchor_cap must be at least 1".to_string(),
            ));
        }
        if !(self.session.camera_anchor_interval_ms >= 0.0) {
            return Err(ConfigError::Validation(
                "session.camera_anchor_interval_ms must not be negative".to_string(),
            ));
        }
        let capacity = self.session.pose_history_capacity;
        if capacity == 0 || capacity > MAX_POSE_HISTORY {
            return Err(ConfigError::Validation(format!(
                "session.pose_history_capacity must be within 1..={MAX_POSE_HISTORY}"
            )));
        }
        let display = &self.display;
        if !(display.depth_near < display.depth_far) {
            return Err(ConfigError::Validation(format!(
                "display.depth_near ({}) must be below display.depth_far ({})",
                display.depth_near, display.depth_far
            )));
        }
        if !(display.field_of_view_degrees > 0.0 && display.field_of_view_degrees < 180.0) {
            return Err(ConfigError::Validation(
                "display.field_of_view_degrees must be within (0, 180)".to_string(),
            ));
        }
        if !(display.aspect > 0.0) {
            return Err(ConfigError::Validation(
                "display.aspect must be positive".to_string(),
            ));
        }
        if !(self.hit_test.fallback_distance > 0.0) {
            return Err(ConfigError::Validation(
                "hit_test.fallback_distance must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn display_config(&self) -> DisplayConfig {
        DisplayConfig {
            sitting_eye_height: self.tracking.sitting_eye_height,
            standing_eye_height: self.tracking.standing_eye_height,
            field_of_view_degrees: self.display.field_of_view_degrees,
            aspect: self.display.aspect,
            depth_near: self.display.depth_near,
            depth_far: self.display.depth_far,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            camera_anchor_interval_ms: self.session.camera_anchor_interval_ms,
            camera_anchor_cap: self.session.camera_anchor_cap,
            frame_pacing: self.session.frame_pacing,
            pose_history_capacity: self.session.pose_history_capacity,
            fallback_distance: self.hit_test.fallback_distance,
        }
    }
}
