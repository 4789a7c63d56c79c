//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use campus_core::{FallbackPolicy, RepositoryConfig};

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API settings.
    pub remote: RemoteConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Sync pass settings.
    pub sync: SyncConfig,
    /// Reachability probing.
    pub connectivity: ConnectivityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// # Example
    ///
    /// ```
    /// use campus_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.remote.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.sync.validate());
        errors.extend(self.connectivity.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Options for the repositories.
    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            request_timeout: Duration::from_secs(self.remote.request_timeout_secs),
            push_timeout: Duration::from_secs(self.sync.push_timeout_secs),
            fallback_policy: self.sync.fallback_policy,
            evict_on_filter: self.sync.evict_on_filter,
        }
    }
}

fn check_range(
    errors: &mut Vec<ValidationError>,
    field: &str,
    value: u64,
    min: u64,
    max: u64,
) {
    if value < min {
        errors.push(ValidationError {
            field: field.to_string(),
            message: format!("{} is too short (minimum {} seconds)", value, min),
        });
    } else if value > max {
        errors.push(ValidationError {
            field: field.to_string(),
            message: format!("{} is too long (maximum {} seconds)", value, max),
        });
    }
}

/// Remote API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the campus API (e.g., "https://campus.example.edu/api").
    pub base_url: String,
    /// Timeout for a single read, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.base_url.is_empty() {
            errors.push(ValidationError {
                field: "remote.base_url".to_string(),
                message: "base URL cannot be empty".to_string(),
            });
        } else if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "remote.base_url".to_string(),
                message: format!(
                    "invalid base URL '{}': must start with http:// or https://",
                    self.base_url
                ),
            });
        }

        check_range(
            &mut errors,
            "remote.request_timeout_secs",
            self.request_timeout_secs,
            1,
            MAX_TIMEOUT_SECS,
        );
        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: campus_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Minimum sync interval in seconds.
pub const MIN_SYNC_INTERVAL: u64 = 10;
/// Maximum sync interval in seconds (one day).
pub const MAX_SYNC_INTERVAL: u64 = 86_400;
/// Upper bound for any network timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Sync pass configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic passes.
    pub interval_secs: u64,
    /// Timeout for a single push, in seconds.
    pub push_timeout_secs: u64,
    /// Spread periodic passes by up to a tenth of the interval.
    pub jitter: bool,
    /// How reads that fell back to the cache are reported.
    pub fallback_policy: FallbackPolicy,
    /// Evict cached rows missing from a filtered network read.
    pub evict_on_filter: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            push_timeout_secs: 15,
            jitter: true,
            fallback_policy: FallbackPolicy::default(),
            evict_on_filter: false,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_range(
            &mut errors,
            "sync.interval_secs",
            self.interval_secs,
            MIN_SYNC_INTERVAL,
            MAX_SYNC_INTERVAL,
        );
        check_range(
            &mut errors,
            "sync.push_timeout_secs",
            self.push_timeout_secs,
            1,
            MAX_TIMEOUT_SECS,
        );
        errors
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Reachability probe configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Seconds between probes.
    pub probe_interval_secs: u64,
    /// Connect timeout of a single probe, in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            probe_timeout_secs: 3,
        }
    }
}

impl ConnectivityConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_range(
            &mut errors,
            "connectivity.probe_interval_secs",
            self.probe_interval_secs,
            1,
            3600,
        );
        check_range(
            &mut errors,
            "connectivity.probe_timeout_secs",
            self.probe_timeout_secs,
            1,
            60,
        );

        if errors.is_empty() && self.probe_timeout_secs > self.probe_interval_secs {
            errors.push(ValidationError {
                field: "connectivity.probe_timeout_secs".to_string(),
                message: format!(
                    "probe timeout {} exceeds probe interval {}",
                    self.probe_timeout_secs, self.probe_interval_secs
                ),
            });
        }
        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `sync.interval_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("campus")
        .join("sync.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.sync.interval_secs, 300);
        assert_eq!(config.storage.path, campus_store::default_db_path());
        assert_eq!(config.repository_config(), RepositoryConfig::default());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [remote]
            base_url = "https://campus.example.edu/api"

            [sync]
            fallback_policy = "error_with_stale"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.remote.base_url, "https://campus.example.edu/api");
        assert_eq!(config.remote.request_timeout_secs, 10);
        assert_eq!(config.sync.fallback_policy, FallbackPolicy::ErrorWithStale);
        assert!(config.sync.jitter);
        assert_eq!(config.connectivity, ConnectivityConfig::default());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("sync.toml");

        let config = Config {
            remote: RemoteConfig {
                base_url: "https://campus.example.edu/api".to_string(),
                request_timeout_secs: 20,
            },
            storage: StorageConfig {
                path: PathBuf::from("/tmp/campus.db"),
            },
            sync: SyncConfig {
                interval_secs: 60,
                evict_on_filter: true,
                ..Default::default()
            },
            connectivity: ConnectivityConfig::default(),
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.repository_config().evict_on_filter);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/sync.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("campus/sync.toml"));
    }

    #[test]
    fn test_remote_validation() {
        let bad = RemoteConfig {
            base_url: "campus.example.edu".to_string(),
            request_timeout_secs: 0,
        };
        let errors = bad.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("http://"));
        assert_eq!(errors[1].field, "remote.request_timeout_secs");
    }

    #[test]
    fn test_sync_interval_bounds() {
        let short = SyncConfig {
            interval_secs: 5,
            ..Default::default()
        };
        assert!(short.validate()[0].message.contains("too short"));

        let long = SyncConfig {
            interval_secs: MAX_SYNC_INTERVAL + 1,
            ..Default::default()
        };
        assert!(long.validate()[0].message.contains("too long"));
    }

    #[test]
    fn test_probe_timeout_must_fit_interval() {
        let config = ConnectivityConfig {
            probe_interval_secs: 2,
            probe_timeout_secs: 5,
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("exceeds"));
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let config = Config {
            storage: StorageConfig {
                path: PathBuf::new(),
            },
            sync: SyncConfig {
                push_timeout_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let display = config.validate().unwrap_err().to_string();
        assert!(display.contains("storage.path"));
        assert!(display.contains("sync.push_timeout_secs"));
    }
}
