//! Estimator and driver configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Progress estimation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Extrapolate between snapshots; when false the display tracks snapshots only
    pub interpolation_enabled: bool,

    /// Fallback velocity in units per second
    pub default_velocity: f64,

    /// Animation cadence
    pub tick_interval_ms: u64,

    /// Status polling cadence
    pub poll_interval_ms: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            interpolation_enabled: true,
            default_velocity: 0.5,
            tick_interval_ms: 100,
            poll_interval_ms: 5000,
        }
    }
}

impl EstimatorConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_velocity.is_finite() || self.default_velocity < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_velocity must be a finite number >= 0, got {}",
                self.default_velocity
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// Animation cadence as a duration, at least 1ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Polling cadence as a duration, at least 1ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EstimatorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.interpolation_enabled);
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = EstimatorConfig::from_json_str(r#"{"interpolation_enabled": false}"#).unwrap();
        assert!(!config.interpolation_enabled);
        assert_eq!(config.default_velocity, 0.5);
        assert_eq!(config.poll_interval_ms, 5000);
    }

    #[test]
    fn test_rejects_negative_velocity() {
        let err = EstimatorConfig::from_json_str(r#"{"default_velocity": -1.0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let config = EstimatorConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EstimatorConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_velocity": 2.5, "tick_interval_ms": 16}}"#).unwrap();

        let config = EstimatorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.default_velocity, 2.5);
        assert_eq!(config.tick_interval_ms, 16);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EstimatorConfig::from_json_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = EstimatorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
