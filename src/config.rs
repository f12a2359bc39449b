//! Configuration for a scout deployment.
//!
//! Stored as JSON. Every field has a default, so an empty object (`{}`) is a
//! valid configuration for a 1080p camera with a 20x20 summary grid.

use crate::core_modules::summary::BucketGrid;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Parameters consumed by the `Scene` tracking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Douglas-Peucker tolerance in pixels, applied when an interaction is persisted.
    pub simplify_epsilon: f64,
    /// Expired interactions no longer than this many seconds are discarded.
    pub min_duration: f32,
    /// Seconds an unmatched interaction may stay idle before it expires.
    pub idle_duration: f32,
    /// Squared pixel distance within which an idle interaction can be resumed.
    pub resume_sq_distance: i64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            simplify_epsilon: 5.0,
            min_duration: 1.0,
            idle_duration: 1.0,
            resume_sq_distance: 40,
        }
    }
}

/// Parameters consumed by the spatial summariser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub frame_width: i32,
    pub frame_height: i32,
    pub grid_columns: usize,
    pub grid_rows: usize,
    /// Milliseconds between summariser passes.
    pub interval_ms: u64,
}

impl SummaryConfig {
    pub fn grid(&self) -> BucketGrid {
        BucketGrid::new(
            self.frame_width,
            self.frame_height,
            self.grid_columns,
            self.grid_rows,
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            frame_width: 1920,
            frame_height: 1080,
            grid_columns: 20,
            grid_rows: 20,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Identity of this sensor. Stamped on every interaction and summary.
    pub owner_id: Uuid,
    pub tracking: TrackingConfig,
    pub summary: SummaryConfig,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            owner_id: Uuid::new_v4(),
            tracking: TrackingConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

impl ScoutConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes this configuration to disk as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tracking;
        if !t.simplify_epsilon.is_finite() || t.simplify_epsilon < 0.0 {
            return Err(invalid("simplify_epsilon must be a non-negative number"));
        }
        if !t.min_duration.is_finite() || t.min_duration < 0.0 {
            return Err(invalid("min_duration must be a non-negative number"));
        }
        if !t.idle_duration.is_finite() || t.idle_duration < 0.0 {
            return Err(invalid("idle_duration must be a non-negative number"));
        }
        if t.resume_sq_distance < 0 {
            return Err(invalid("resume_sq_distance must not be negative"));
        }

        let s = &self.summary;
        if s.frame_width <= 0 || s.frame_height <= 0 {
            return Err(invalid("frame dimensions must be positive"));
        }
        if s.grid_columns == 0 || s.grid_rows == 0 {
            return Err(invalid("summary grid must have at least one row and column"));
        }
        if s.grid().bucket_width() == 0 || s.grid().bucket_height() == 0 {
            return Err(invalid("summary grid is finer than the frame"));
        }
        if s.interval_ms == 0 {
            return Err(invalid("interval_ms must be positive"));
        }

        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid(reason.to_string())
}
