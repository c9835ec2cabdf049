#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use toml_config::TomlConfig;

use crate::core::source::DEFAULT_CHUNK_SIZE;
use crate::utils::error::{Result, ScanError};
use crate::utils::validation::{validate_path, validate_positive_number, validate_range, Validate};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_UPDATE_INTERVAL_SECS: f64 = 0.5;
pub const MIN_UPDATE_INTERVAL_SECS: f64 = 0.1;
pub const MAX_UPDATE_INTERVAL_SECS: f64 = 5.0;
pub const DEFAULT_MEMORY_SAMPLE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;

/// Settings for one upload pipeline. Built once at startup and shared
/// read-only by every request.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub upload_dir: PathBuf,
    pub max_file_size: u64,
    pub chunk_size: usize,
    pub update_interval: Duration,
    pub memory_sample_interval: Duration,
    pub event_queue_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            update_interval: Duration::from_secs_f64(DEFAULT_UPDATE_INTERVAL_SECS),
            memory_sample_interval: Duration::from_millis(DEFAULT_MEMORY_SAMPLE_INTERVAL_MS),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

impl ScanConfig {
    /// Reads overrides from the process environment; unset variables keep
    /// their defaults, malformed ones are reported.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, resolving each variable through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            upload_dir: lookup("UPLOAD_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_file_size: parse_var(&lookup, "MAX_FILE_SIZE")?.unwrap_or(defaults.max_file_size),
            chunk_size: parse_var(&lookup, "CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            update_interval: parse_var::<f64, _>(&lookup, "UPDATE_INTERVAL")?
                .map(interval_from_secs)
                .transpose()?
                .unwrap_or(defaults.update_interval),
            memory_sample_interval: parse_var(&lookup, "MEMORY_SAMPLE_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.memory_sample_interval),
            event_queue_capacity: parse_var(&lookup, "EVENT_QUEUE_CAPACITY")?
                .unwrap_or(defaults.event_queue_capacity),
        })
    }
}

impl Validate for ScanConfig {
    fn validate(&self) -> Result<()> {
        validate_path("upload_dir", &self.upload_dir.to_string_lossy())?;
        validate_positive_number("max_file_size", self.max_file_size, 1)?;
        validate_positive_number("chunk_size", self.chunk_size as u64, 1)?;
        validate_range(
            "update_interval",
            self.update_interval.as_secs_f64(),
            MIN_UPDATE_INTERVAL_SECS,
            MAX_UPDATE_INTERVAL_SECS,
        )?;
        validate_positive_number(
            "memory_sample_interval",
            self.memory_sample_interval.as_millis() as u64,
            1,
        )?;
        validate_positive_number("event_queue_capacity", self.event_queue_capacity as u64, 1)?;
        Ok(())
    }
}

/// Seconds to a `Duration`, rejecting values `Duration` cannot hold.
pub fn interval_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| ScanError::InvalidConfigValueError {
        field: "update_interval".to_string(),
        value: secs.to_string(),
        reason: e.to_string(),
    })
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ScanError::InvalidConfigValueError {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_file_size, 10_485_760);
        assert_eq!(config.chunk_size, 100_000);
        assert_eq!(config.update_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_update_interval_bounds() {
        let mut config = ScanConfig::default();
        config.update_interval = Duration::from_millis(50);
        assert!(matches!(
            config.validate(),
            Err(ScanError::InvalidConfigValueError { .. })
        ));
        config.update_interval = Duration::from_secs(6);
        assert!(config.validate().is_err());
        config.update_interval = Duration::from_millis(100);
        assert!(config.validate().is_ok());
        config.update_interval = Duration::from_secs(5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let config = ScanConfig {
            chunk_size: 0,
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = ScanConfig::from_lookup(vars(&[
            ("CHUNK_SIZE", "2500"),
            ("UPDATE_INTERVAL", "0.25"),
            ("UPLOAD_FOLDER", "/srv/uploads"),
        ]))
        .unwrap();
        assert_eq!(config.chunk_size, 2500);
        assert_eq!(config.update_interval, Duration::from_millis(250));
        assert_eq!(config.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn test_from_lookup_rejects_malformed_value() {
        let err = ScanConfig::from_lookup(vars(&[("CHUNK_SIZE", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ScanError::InvalidConfigValueError { ref field, .. } if field == "CHUNK_SIZE"
        ));
    }

    #[test]
    fn test_from_lookup_without_variables_gives_defaults() {
        assert_eq!(ScanConfig::from_lookup(|_| None).unwrap(), ScanConfig::default());
    }

    #[test]
    fn test_negative_interval_is_rejected() {
        assert!(interval_from_secs(-1.0).is_err());
        assert_eq!(
            interval_from_secs(1.5).unwrap(),
            Duration::from_millis(1500)
        );
    }
}
