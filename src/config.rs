use crate::error::ConfigError;
use crate::models::{Stream, VehicleId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mainline private length (1022.56 m) minus the 40 m approach allowance
pub const DEFAULT_MAINLINE_MERGE_OFFSET: f64 = 982.56;
/// Ramp private length (1001.47 m) minus the 40 m approach allowance
pub const DEFAULT_RAMP_MERGE_OFFSET: f64 = 961.47;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Vehicle ids of this stream start with this prefix (`m` for `m.0`)
    pub id_prefix: String,
    /// Position along the stream's route where the shared segment begins
    pub merge_offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mainline: StreamConfig,
    pub ramp: StreamConfig,
    /// Added to the vehicle length to form its safety margin
    pub safety_gap: f64,
    /// Seconds the merge entry is pushed back after each failed follow plan
    pub entry_retry_increment: f64,
    pub max_entry_retries: usize,
    /// Integration ceiling for a single planner call
    pub max_plan_steps: usize,
    /// Distance ahead of the front bumper at which lanes are resolved
    pub head_clearance: f64,
    /// Run the background consistency observer
    pub diagnostics: bool,
    pub diagnostics_interval_ms: u64,
    /// Compare scheduled and reported positions every N control ticks
    pub deviation_check_every: u64,
    /// Deviation (m) above which a warning is logged
    pub deviation_tolerance: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mainline: StreamConfig {
                id_prefix: "m".to_string(),
                merge_offset: DEFAULT_MAINLINE_MERGE_OFFSET,
            },
            ramp: StreamConfig {
                id_prefix: "r".to_string(),
                merge_offset: DEFAULT_RAMP_MERGE_OFFSET,
            },
            safety_gap: 3.0,
            entry_retry_increment: 1.0,
            max_entry_retries: 120,
            max_plan_steps: 200_000,
            head_clearance: 0.1,
            diagnostics: false,
            diagnostics_interval_ms: 100,
            deviation_check_every: 1000,
            deviation_tolerance: 0.4,
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// # Errors
    ///
    /// Returns an error describing the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for stream in Stream::ALL {
            let stream_config = self.stream(stream);
            if stream_config.id_prefix.is_empty() {
                return Err(ConfigError::Invalid(format!("{stream} id prefix is empty")));
            }
            if stream_config.merge_offset.is_nan() || stream_config.merge_offset <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{stream} merge offset must be positive, got {}",
                    stream_config.merge_offset
                )));
            }
        }
        if self.mainline.id_prefix.starts_with(&self.ramp.id_prefix)
            || self.ramp.id_prefix.starts_with(&self.mainline.id_prefix)
        {
            return Err(ConfigError::Invalid("stream id prefixes overlap".to_string()));
        }
        if self.safety_gap < 0.0 {
            return Err(ConfigError::Invalid("safety gap must not be negative".to_string()));
        }
        if self.entry_retry_increment.is_nan() || self.entry_retry_increment <= 0.0 {
            return Err(ConfigError::Invalid("entry retry increment must be positive".to_string()));
        }
        if self.max_entry_retries == 0 {
            return Err(ConfigError::Invalid("at least one merge entry attempt is required".to_string()));
        }
        if self.max_plan_steps == 0 {
            return Err(ConfigError::Invalid("planner step budget must be positive".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn stream(&self, stream: Stream) -> &StreamConfig {
        match stream {
            Stream::Mainline => &self.mainline,
            Stream::Ramp => &self.ramp,
        }
    }

    #[must_use]
    pub fn merge_offset(&self, stream: Stream) -> f64 {
        self.stream(stream).merge_offset
    }

    /// Classify a vehicle by the id prefix of its stream
    #[must_use]
    pub fn classify(&self, vehicle: &VehicleId) -> Option<Stream> {
        Stream::ALL
            .into_iter()
            .find(|&stream| vehicle.as_str().starts_with(&self.stream(stream).id_prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.merge_offset(Stream::Mainline), 982.56);
        assert_eq!(config.merge_offset(Stream::Ramp), 961.47);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = SchedulerConfig::from_json_str(r#"{"safety_gap": 4.5, "max_entry_retries": 10}"#)
            .expect("valid config");
        assert_eq!(config.safety_gap, 4.5);
        assert_eq!(config.max_entry_retries, 10);
        assert_eq!(config.entry_retry_increment, 1.0);
        assert_eq!(config.mainline.id_prefix, "m");
    }

    #[test]
    fn test_rejects_zero_retries() {
        let result = SchedulerConfig::from_json_str(r#"{"max_entry_retries": 0}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_overlapping_prefixes() {
        let result = SchedulerConfig::from_json_str(
            r#"{"ramp": {"id_prefix": "m", "merge_offset": 900.0}}"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = SchedulerConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_classify_by_prefix() {
        let config = SchedulerConfig::default();
        assert_eq!(config.classify(&VehicleId::from("m.3")), Some(Stream::Mainline));
        assert_eq!(config.classify(&VehicleId::from("r.0")), Some(Stream::Ramp));
        assert_eq!(config.classify(&VehicleId::from("x.1")), None);
    }
}
