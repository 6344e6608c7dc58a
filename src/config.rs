//! Safety limits for backend reads
//!
//! The defaults are the limits the storefront runs with. A JSON file can
//! override any subset of them; absent fields keep their defaults.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Maximum backend reads per calendar day
pub const MAX_DAILY_READS: u32 = 1000;

/// Maximum number of cached sites
pub const MAX_CACHE_SIZE: usize = 100;

/// Minimum time between two backend reads
pub const MIN_READ_INTERVAL: Duration = Duration::from_secs(1);

/// How long a cached site is served without going back to the backend
pub const CACHE_FRESHNESS: Duration = Duration::from_secs(10 * 60);

/// Share of the daily ceiling at which the dashboard turns red
pub const WARNING_THRESHOLD: f64 = 0.8;

/// Share of the daily ceiling at which the dashboard turns yellow
pub const CAUTION_THRESHOLD: f64 = 0.6;

/// Backend price in USD per 100,000 document reads
pub const COST_PER_100K_READS: f64 = 0.06;

/// Errors that can occur when loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for this configuration
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Limits enforced by the read governor and cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SafetyConfig {
    pub max_daily_reads: u32,
    pub max_cache_size: usize,
    #[serde(rename = "minReadIntervalMs", with = "duration_ms")]
    pub min_read_interval: Duration,
    #[serde(rename = "cacheFreshnessMs", with = "duration_ms")]
    pub cache_freshness: Duration,
    /// Dashboard coloring only
    pub warning_threshold: f64,
    /// Dashboard coloring only
    pub caution_threshold: f64,
    pub cost_per_100k_reads: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_daily_reads: MAX_DAILY_READS,
            max_cache_size: MAX_CACHE_SIZE,
            min_read_interval: MIN_READ_INTERVAL,
            cache_freshness: CACHE_FRESHNESS,
            warning_threshold: WARNING_THRESHOLD,
            caution_threshold: CAUTION_THRESHOLD,
            cost_per_100k_reads: COST_PER_100K_READS,
        }
    }
}

impl SafetyConfig {
    /// Default location of the override file
    ///
    /// `~/.config/sitecache/safety.json` on Linux. Returns `None` when no home
    /// directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "sitecache")?;
        Some(dirs.config_dir().join("safety.json"))
    }

    /// Loads and validates a configuration file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SafetyConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise the default file if it exists,
    /// otherwise the built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::load_from(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Checks that the dashboard thresholds make sense
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("warningThreshold", self.warning_threshold),
            ("cautionThreshold", self.caution_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if self.caution_threshold > self.warning_threshold {
            return Err(ConfigError::Invalid(
                "cautionThreshold must not exceed warningThreshold".to_string(),
            ));
        }
        if !self.cost_per_100k_reads.is_finite() || self.cost_per_100k_reads < 0.0 {
            return Err(ConfigError::Invalid(
                "costPer100kReads must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serializes a `Duration` as whole milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_matches_constants() {
        let config = SafetyConfig::default();
        assert_eq!(config.max_daily_reads, 1000);
        assert_eq!(config.max_cache_size, 100);
        assert_eq!(config.min_read_interval, Duration::from_secs(1));
        assert_eq!(config.cache_freshness, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("safety.json");
        fs::write(&path, r#"{ "maxDailyReads": 50, "minReadIntervalMs": 250 }"#).unwrap();

        let config = SafetyConfig::load_from(&path).expect("Config should load");

        assert_eq!(config.max_daily_reads, 50);
        assert_eq!(config.min_read_interval, Duration::from_millis(250));
        assert_eq!(config.max_cache_size, MAX_CACHE_SIZE);
        assert_eq!(config.cache_freshness, CACHE_FRESHNESS);
    }

    #[test]
    fn test_serialized_durations_are_milliseconds() {
        let json = serde_json::to_value(SafetyConfig::default()).unwrap();
        assert_eq!(json["minReadIntervalMs"], 1000);
        assert_eq!(json["cacheFreshnessMs"], 600_000);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let config = SafetyConfig {
            warning_threshold: 0.5,
            caution_threshold: 0.7,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cautionThreshold"));
    }

    #[test]
    fn test_rejects_threshold_above_one() {
        let config = SafetyConfig {
            warning_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let result = SafetyConfig::load_from(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("safety.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SafetyConfig::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
