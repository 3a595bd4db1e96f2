//! Configuration loading traits and types.
//!
//! Every gun-driver configuration file is TOML. Structs derive
//! `Deserialize` and pick up [`ConfigLoader::load`] through a blanket impl.
//!
//! ```rust,no_run
//! use gun_common::config::{ConfigError, ConfigLoader};
//! use gun_common::gun::config::BoardConfig;
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let board = BoardConfig::load(Path::new("a37474.toml"))?;
//!     board.validate()?;
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// File could not be read or TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log verbosity, lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Fields common to every gun-driver service configuration.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "a37474-bench"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier used in log output.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    crate::consts::SERVICE_NAME.to_string()
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from TOML files.
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` if it cannot be read or is not valid TOML
///
/// Semantic validation is left to the concrete type.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ParseError(format!("{}: {e}", path.display()))
            }
        })?;
        debug!(path = %path.display(), bytes = content.len(), "configuration file read");
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
