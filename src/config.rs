//! Tracking configuration.
//!
//! All thresholds and store keys live in one [`TrackingConfig`] value handed to every component
//! at construction. It can be read from TOML text, from a TOML file on native targets, or (with
//! the `wasm` feature) from a plain JavaScript object.
//!
//! ```toml
//! completion_threshold = 90
//! save_interval_seconds = 10.0
//! resume_threshold_seconds = 5.0
//! progress_field_key = "video-data"
//! activity_field_key = "activity-data"
//! ```
use crate::error::TrackingError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use std::{fs::read_to_string, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Percent watched at which an asset counts as completed.
    pub completion_threshold: u8,
    /// Media seconds between throttled position write-throughs.
    pub save_interval_seconds: f64,
    /// A saved position must exceed this many seconds before playback resumes from it.
    pub resume_threshold_seconds: f64,
    /// Member custom field holding the progress document.
    pub progress_field_key: String,
    /// Member custom field holding the activity document.
    pub activity_field_key: String,
    /// Minimum spacing between two refresh passes of the sync loop.
    pub debounce_ms: u64,
    /// Bounded readiness polling: number of probes.
    pub retry_attempts: u32,
    /// Bounded readiness polling: delay between probes.
    pub retry_delay_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            completion_threshold: 90,
            save_interval_seconds: 10.0,
            resume_threshold_seconds: 5.0,
            progress_field_key: "video-data".to_string(),
            activity_field_key: "activity-data".to_string(),
            debounce_ms: 1000,
            retry_attempts: 50,
            retry_delay_ms: 100,
        }
    }
}

impl TrackingConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, TrackingError> {
        let config: TrackingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TrackingError> {
        tracing::debug!("Reading tracking config from {:?}", path.as_ref());
        if !path.as_ref().exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(TrackingConfig::default());
        }
        TrackingConfig::from_toml_str(&read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), TrackingError> {
        if !(1..=100).contains(&self.completion_threshold) {
            return Err(TrackingError::Config(format!(
                "completion_threshold must be within 1..=100, got {}",
                self.completion_threshold
            )));
        }
        if !(self.save_interval_seconds > 0.0) {
            return Err(TrackingError::Config(
                "save_interval_seconds must be positive".to_string(),
            ));
        }
        if self.resume_threshold_seconds < 0.0 {
            return Err(TrackingError::Config(
                "resume_threshold_seconds must not be negative".to_string(),
            ));
        }
        if self.progress_field_key.trim().is_empty() || self.activity_field_key.trim().is_empty()
        {
            return Err(TrackingError::Config(
                "store field keys must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = TrackingConfig::from_toml_str("completion_threshold = 95").unwrap();
        assert_eq!(config.completion_threshold, 95);
        assert_eq!(config.save_interval_seconds, 10.0);
        assert_eq!(config.progress_field_key, "video-data");
        assert_eq!(config.debounce(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = TrackingConfig::from_toml_str("completion_threshold = 0").unwrap_err();
        assert!(matches!(err, TrackingError::Config(_)));
        let err = TrackingConfig::from_toml_str("save_interval_seconds = 0.0").unwrap_err();
        assert!(matches!(err, TrackingError::Config(_)));
        let err = TrackingConfig::from_toml_str("activity_field_key = \" \"").unwrap_err();
        assert!(matches!(err, TrackingError::Config(_)));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = TrackingConfig::load("/definitely/not/here/tracking.toml").unwrap();
        assert_eq!(config, TrackingConfig::default());
    }
}
