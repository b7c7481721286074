use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-challenge timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypingTuning {
    /// Minimum spacing between idle progress notifications.
    pub progress_emit_interval_ms: u64,
    /// How long a mistyped character stays visible after the keystroke.
    pub invalid_display_ms: u64,
    pub letter_time_bonus_seconds: f64,
    pub max_remaining_seconds: f64,
}

impl Default for TypingTuning {
    fn default() -> Self {
        Self {
            progress_emit_interval_ms: 100,
            invalid_display_ms: 300,
            letter_time_bonus_seconds: 0.5,
            max_remaining_seconds: 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterTuning {
    /// Input buffer capacity in characters.
    pub buffer_capacity: usize,
    pub pending_queue_capacity: usize,
}

impl Default for RouterTuning {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
            pending_queue_capacity: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FocusTuning {
    /// Distance from a target at which the approach counts as arrived.
    pub stop_distance: f32,
    /// Radius of the eligibility region around the player.
    pub trigger_radius: f32,
    /// World time scale while a focus session runs.
    pub time_scale: f64,
}

impl Default for FocusTuning {
    fn default() -> Self {
        Self {
            stop_distance: 32.0,
            trigger_radius: 160.0,
            time_scale: 0.22,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub typing: TypingTuning,
    pub router: RouterTuning,
    pub focus: FocusTuning,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to parse config at `{path}`: {message}")]
    Parse { path: String, message: String },
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineConfig {
    /// Parses JSON, reporting the failing field path on error.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let deserializer = &mut serde_json::Deserializer::from_str(raw);
        let config: Self =
            serde_path_to_error::deserialize(deserializer).map_err(|error| ConfigError::Parse {
                path: error.path().to_string(),
                message: error.inner().to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_finite_non_negative(
            "typing.letter_time_bonus_seconds",
            self.typing.letter_time_bonus_seconds,
        )?;
        require_finite_positive(
            "typing.max_remaining_seconds",
            self.typing.max_remaining_seconds,
        )?;
        if self.typing.progress_emit_interval_ms == 0 {
            return Err(invalid("typing.progress_emit_interval_ms", "must be > 0"));
        }
        if self.router.buffer_capacity == 0 {
            return Err(invalid("router.buffer_capacity", "must be > 0"));
        }
        if self.router.pending_queue_capacity == 0 {
            return Err(invalid("router.pending_queue_capacity", "must be > 0"));
        }
        require_finite_non_negative("focus.stop_distance", self.focus.stop_distance as f64)?;
        require_finite_positive("focus.trigger_radius", self.focus.trigger_radius as f64)?;
        require_finite_positive("focus.time_scale", self.focus.time_scale)?;
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn require_finite_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, "must be finite and >= 0"));
    }
    Ok(())
}

fn require_finite_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, "must be finite and > 0"));
    }
    Ok(())
}
