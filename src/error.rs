//! Error types and handling for the `Skycast` core

use thiserror::Error;

/// Main error type for the `Skycast` core
#[derive(Error, Debug)]
pub enum SkycastError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Upstream API communication errors
    #[error("API error: {message}")]
    Api { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// City dataset load errors (missing or malformed local data)
    #[error("City data error: {message}")]
    CityData { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// HTTP transport errors
    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// JSON encoding/decoding errors
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl SkycastError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new city data error
    pub fn city_data<S: Into<String>>(message: S) -> Self {
        Self::CityData {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SkycastError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            SkycastError::Api { .. } | SkycastError::Http { .. } => {
                "Unable to reach upstream weather services. Please try again shortly.".to_string()
            }
            SkycastError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            SkycastError::CityData { .. } => {
                "City dataset is missing or unreadable. Reinstall the data files.".to_string()
            }
            SkycastError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            SkycastError::Json { .. } => {
                "Received data that could not be decoded.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = SkycastError::config("missing API key");
        assert!(matches!(config_err, SkycastError::Config { .. }));

        let api_err = SkycastError::api("connection failed");
        assert!(matches!(api_err, SkycastError::Api { .. }));

        let validation_err = SkycastError::validation("invalid coordinates");
        assert!(matches!(validation_err, SkycastError::Validation { .. }));
    }

    #[test]
    fn test_user_messages() {
        let config_err = SkycastError::config("test");
        assert!(config_err.user_message().contains("Configuration error"));

        let api_err = SkycastError::api("test");
        assert!(api_err.user_message().contains("Unable to reach"));

        let validation_err = SkycastError::validation("test input");
        assert!(validation_err.user_message().contains("test input"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let skycast_err: SkycastError = io_err.into();
        assert!(matches!(skycast_err, SkycastError::Io { .. }));
    }
}
