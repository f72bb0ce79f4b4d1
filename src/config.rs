use std::net::SocketAddr;
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::indicator::engine::DEFAULT_RSI_PERIOD;
use crate::retention::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".into()
}

fn default_backend() -> String {
    "sqlite".into()
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

fn default_rsi_period() -> usize {
    DEFAULT_RSI_PERIOD
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub indicators: IndicatorConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Accepted values: `"sqlite"` | `"memory"`
    #[serde(default = "default_backend")]
    pub backend: String,
}

#[derive(Debug, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
}

// Section defaults mirror the per-field defaults so an absent table and an
// empty table parse identically.
impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: default_rsi_period(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, Report<ConfigError>> {
        self.bind_addr
            .parse::<SocketAddr>()
            .change_context(ConfigError::Validation {
                field: format!("server.bind_addr \"{}\" is not a socket address", self.bind_addr),
            })
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const VALID_BACKENDS: &[&str] = &["sqlite", "memory"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    config.server.socket_addr()?;
    validate_storage(config)?;
    validate_retention(config)?;
    validate_indicators(config)?;
    Ok(())
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "general.log_format \"{}\" is not valid",
                config.general.log_format
            ),
        }));
    }
    Ok(())
}

fn validate_storage(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_BACKENDS.contains(&config.storage.backend.as_str()) {
        return Err(Report::new(ConfigError::Validation {
            field: format!("storage.backend \"{}\" is not valid", config.storage.backend),
        }));
    }
    Ok(())
}

fn validate_retention(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let days = config.retention.window_days;
    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(Report::new(ConfigError::Validation {
            field: format!("retention.window_days must be in 1..={MAX_WINDOW_DAYS}, got {days}"),
        }));
    }
    Ok(())
}

fn validate_indicators(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.indicators.rsi_period == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "indicators.rsi_period must be >= 1".into(),
        }));
    }
    Ok(())
}
