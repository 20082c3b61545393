//! Configuration management for the `Skycast` core
//!
//! Handles loading configuration from an optional file and environment
//! variables, and provides validation for all configuration settings.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::coordinates::Coordinates;
use crate::error::SkycastError;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkycastConfig {
    /// User agent sent with every upstream request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// City dataset configuration
    #[serde(default)]
    pub cities: CitiesConfig,
    /// National forecast service configuration
    #[serde(default)]
    pub nws: NwsConfig,
    /// Regional air-quality service configuration
    #[serde(default)]
    pub airnow: AirNowConfig,
    /// Private station network configuration
    #[serde(default)]
    pub station: StationConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// City dataset settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitiesConfig {
    /// Directory holding the prepared dataset files
    #[serde(default = "default_cities_data_dir")]
    pub data_dir: String,
}

/// National forecast service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NwsConfig {
    /// Base URL for the forecast API
    #[serde(default = "default_nws_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
}

/// Regional air-quality service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirNowConfig {
    /// API key; requests fail without one
    pub api_key: Option<String>,
    /// Base URL for the air-quality API
    #[serde(default = "default_airnow_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
}

/// Private station network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// API key; requests fail without one
    pub api_key: Option<String>,
    /// API secret paired with the key
    pub api_secret: Option<String>,
    /// Base URL for the station network API
    #[serde(default = "default_station_base_url")]
    pub base_url: String,
    /// "lat,lon" of the home station the network observes
    #[serde(default = "default_station_home_coordinates")]
    pub home_coordinates: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_user_agent() -> String {
    format!("skycast/{}", env!("CARGO_PKG_VERSION"))
}

fn default_cities_data_dir() -> String {
    "./data".to_string()
}

fn default_nws_base_url() -> String {
    "https://api.weather.gov/".to_string()
}

fn default_airnow_base_url() -> String {
    "https://www.airnowapi.org/".to_string()
}

fn default_station_base_url() -> String {
    "https://api.weatherlink.com/v2/".to_string()
}

fn default_station_home_coordinates() -> String {
    "42.35826159869919,-71.05360507074275".to_string()
}

fn default_timeout_seconds() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SkycastConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            cities: CitiesConfig::default(),
            nws: NwsConfig::default(),
            airnow: AirNowConfig::default(),
            station: StationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CitiesConfig {
    fn default() -> Self {
        Self {
            data_dir: default_cities_data_dir(),
        }
    }
}

impl Default for NwsConfig {
    fn default() -> Self {
        Self {
            base_url: default_nws_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for AirNowConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_airnow_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            base_url: default_station_base_url(),
            home_coordinates: default_station_home_coordinates(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SkycastConfig {
    /// Load configuration from `config/skycast.*` (if present) overridden by
    /// `SKYCAST__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when sources fail to parse or the
    /// resulting settings are invalid.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/skycast").required(false))
            .add_source(Environment::with_prefix("SKYCAST").separator("__"))
            .build()
            .map_err(|err| SkycastError::config(err.to_string()))?;

        let config: SkycastConfig = config
            .try_deserialize()
            .map_err(|err| SkycastError::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.is_empty() {
            return Err(SkycastError::config("user_agent must not be empty"));
        }
        if self.cities.data_dir.is_empty() {
            return Err(SkycastError::config("cities.data_dir must not be empty"));
        }

        let home = Coordinates::parse(&self.station.home_coordinates);
        if !home.is_some_and(|c| c.is_valid()) {
            return Err(SkycastError::config(format!(
                "station.home_coordinates \"{}\" is not a valid \"lat,lon\" pair",
                self.station.home_coordinates
            )));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(SkycastError::config(format!(
                    "logging.level \"{other}\" is not one of error, warn, info, debug, trace"
                )));
            }
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(SkycastError::config(format!(
                    "logging.format \"{other}\" is not one of pretty, json"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SkycastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.nws.base_url, "https://api.weather.gov/");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = SkycastConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_home_coordinates_rejected() {
        let mut config = SkycastConfig::default();
        config.station.home_coordinates = "not-a-pair".to_string();
        assert!(config.validate().is_err());

        config.station.home_coordinates = "95.0,200.0".to_string();
        assert!(config.validate().is_err());
    }
}
