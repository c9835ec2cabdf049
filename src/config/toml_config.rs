use crate::config::{interval_from_secs, ScanConfig};
use crate::utils::error::{Result, ScanError};
use crate::utils::validation::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File form of [`ScanConfig`]. Every section and key is optional; missing
/// values fall back to the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub upload: Option<UploadSection>,
    pub scan: Option<ScanSection>,
    pub monitoring: Option<MonitoringSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSection {
    pub folder: Option<String>,
    pub max_file_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSection {
    pub chunk_size: Option<usize>,
    pub update_interval: Option<f64>,
    pub event_queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringSection {
    pub memory_sample_interval_ms: Option<u64>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ScanError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; unknown variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ScanError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Resolves the file into a full configuration.
    pub fn into_scan_config(self) -> Result<ScanConfig> {
        let defaults = ScanConfig::default();
        let upload = self.upload.unwrap_or_default();
        let scan = self.scan.unwrap_or_default();
        let monitoring = self.monitoring.unwrap_or_default();

        Ok(ScanConfig {
            upload_dir: upload
                .folder
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_file_size: upload.max_file_size.unwrap_or(defaults.max_file_size),
            chunk_size: scan.chunk_size.unwrap_or(defaults.chunk_size),
            update_interval: scan
                .update_interval
                .map(interval_from_secs)
                .transpose()?
                .unwrap_or(defaults.update_interval),
            memory_sample_interval: monitoring
                .memory_sample_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.memory_sample_interval),
            event_queue_capacity: scan
                .event_queue_capacity
                .unwrap_or(defaults.event_queue_capacity),
        })
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.clone().into_scan_config()?.validate()
    }
}
