//! Config loading, resolution, validation, and conversion helpers.

use super::model::Config;
use super::types::DEFAULT_CONFIG_FILE;
use crate::error::{Result, SchedlockError};
use crate::locks::RetryPolicy;
use chrono::Duration;
use std::path::{Path, PathBuf};

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the schedlock.yaml file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(SchedlockError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            SchedlockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Resolve the config to use.
    ///
    /// An explicit path must exist. Without one, `schedlock.yaml` in `cwd` is
    /// loaded when present, otherwise defaults are used.
    pub fn resolve(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let candidate = Self::default_path(cwd);
                if candidate.is_file() {
                    Self::load(candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Path of the implicit config file for a working directory.
    pub fn default_path(cwd: &Path) -> PathBuf {
        cwd.join(DEFAULT_CONFIG_FILE)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file means all defaults.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            SchedlockError::UserError(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            SchedlockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `database_path` must be non-empty
    /// - `lock_stale_minutes` must be positive
    /// - `max_retries` must be positive
    pub fn validate(&self) -> Result<()> {
        if self.database_path.trim().is_empty() {
            return Err(SchedlockError::UserError(
                "config validation failed: database_path must not be empty".to_string(),
            ));
        }

        if self.lock_stale_minutes == 0 {
            return Err(SchedlockError::UserError(
                "config validation failed: lock_stale_minutes must be greater than 0".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(SchedlockError::UserError(
                "config validation failed: max_retries must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Staleness threshold as a chrono duration.
    pub fn stale_after(&self) -> Duration {
        Duration::minutes(i64::from(self.lock_stale_minutes))
    }

    /// Retry policy described by this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: std::time::Duration::from_millis(self.retry_base_delay_ms),
            max_jitter: std::time::Duration::from_millis(self.retry_max_jitter_ms),
        }
    }

    /// Database path resolved against a base directory when relative.
    pub fn database_path_in(&self, base: &Path) -> PathBuf {
        let path = Path::new(&self.database_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}
