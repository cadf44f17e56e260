//! Service configuration handling.
//!
//! Configuration loads from `config.toml` in the platform config directory,
//! falling back to defaults when the file is absent. The OAuth client secret
//! deliberately has no place here; it belongs in the key custodian or the
//! environment, never in a config file.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::provider::ProviderEndpoints;
use crate::refresh::RefreshConfig;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed.
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Parsing the config file failed.
    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Creating the data directory failed.
    #[error("failed to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Which eBay environment the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Sandbox,
}

impl Environment {
    /// OAuth endpoints for this environment.
    pub fn endpoints(&self) -> ProviderEndpoints {
        match self {
            Self::Production => ProviderEndpoints::ebay_production(),
            Self::Sandbox => ProviderEndpoints::ebay_sandbox(),
        }
    }
}

/// Refresh tuning as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Minutes before expiry at which a token counts as expiring.
    #[serde(default = "default_expiry_buffer_minutes")]
    pub expiry_buffer_minutes: i64,

    /// Cap on exchange attempts per refresh.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the per-retry backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Wall-clock limit on a single exchange attempt, in seconds.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

fn default_expiry_buffer_minutes() -> i64 {
    5
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_attempt_timeout_secs() -> u64 {
    20
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            expiry_buffer_minutes: default_expiry_buffer_minutes(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

impl RefreshSettings {
    /// Convert into the coordinator's runtime configuration.
    pub fn to_refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            expiry_buffer: chrono::Duration::minutes(self.expiry_buffer_minutes),
            max_attempts: self.max_attempts,
            initial_backoff: std::time::Duration::from_millis(self.initial_backoff_ms),
            max_backoff: std::time::Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: std::time::Duration::from_secs(self.attempt_timeout_secs),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory for the registry, role, and credential files.
    pub data_dir: PathBuf,

    /// Which eBay environment to talk to.
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// OAuth client ID. The client secret is never configured here.
    #[serde(default)]
    pub client_id: String,

    /// Refresh coordinator tuning.
    #[serde(default)]
    pub refresh: RefreshSettings,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_environment() -> Environment {
    Environment::Production
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".sellerlink"));

        Self {
            config_path: PathBuf::new(),
            data_dir,
            environment: default_environment(),
            client_id: String::new(),
            refresh: RefreshSettings::default(),
            log_level: default_log_level(),
        }
    }
}

/// Load configuration from the default location or create defaults.
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    let config_path = project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("sellerlink.toml"));

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path).map_err(|source| {
            ConfigError::Read {
                path: config_path.clone(),
                source,
            }
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?
    } else {
        ServiceConfig::default()
    };

    config.config_path = config_path;

    std::fs::create_dir_all(&config.data_dir).map_err(|source| ConfigError::DataDir {
        path: config.data_dir.clone(),
        source,
    })?;

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "sellerlink", "sellerlink")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.refresh.max_attempts, 4);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ServiceConfig = toml::from_str(
            r#"
            data_dir = "/tmp/sellerlink"
            environment = "sandbox"
            client_id = "client-123"

            [refresh]
            max_attempts = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.client_id, "client-123");
        assert_eq!(config.refresh.max_attempts, 6);
        // Unspecified settings keep their defaults.
        assert_eq!(config.refresh.expiry_buffer_minutes, 5);
    }

    #[test]
    fn test_refresh_settings_conversion() {
        let settings = RefreshSettings {
            expiry_buffer_minutes: 10,
            max_attempts: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 1_000,
            attempt_timeout_secs: 5,
        };

        let config = settings.to_refresh_config();
        assert_eq!(config.expiry_buffer, chrono::Duration::minutes(10));
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.initial_backoff, std::time::Duration::from_millis(250));
    }

    #[test]
    fn test_environment_endpoints() {
        assert!(Environment::Sandbox.endpoints().token_url.contains("sandbox"));
        assert!(!Environment::Production.endpoints().token_url.contains("sandbox"));
    }
}
