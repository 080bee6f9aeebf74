//! Configuration management for Roomkey
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file,
//! `ROOMKEY_*` environment variables, command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::refresh::{RefreshSettings, RotationPolicy, DEFAULT_REFRESH_PATH};
use crate::error::{Result, RoomkeyError};
use crate::session::backend::KeyringBackend;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/roomkey.yaml";

/// Main configuration structure for Roomkey
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Booking API endpoint settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Where the session is persisted
    #[serde(default)]
    pub session: SessionConfig,
    /// Token refresh behaviour
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Booking API endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every API path is appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds, refresh calls included
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Where session records are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackendKind {
    /// A JSON file, by default in the platform data directory
    #[default]
    File,
    /// The operating system keyring
    Keyring,
    /// Process memory only; nothing survives exit
    Memory,
}

impl std::str::FromStr for SessionBackendKind {
    type Err = RoomkeyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(RoomkeyError::Config(format!(
                "Invalid session backend: {}. Must be one of: file, keyring, memory",
                other
            ))),
        }
    }
}

/// Session persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Backend holding the session records
    #[serde(default)]
    pub backend: SessionBackendKind,

    /// Session file for the `file` backend; defaults to the platform data
    /// directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Keyring service name for the `keyring` backend
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

fn default_keyring_service() -> String {
    KeyringBackend::DEFAULT_SERVICE.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackendKind::default(),
            path: None,
            keyring_service: default_keyring_service(),
        }
    }
}

impl SessionConfig {
    /// Resolves the session file location.
    ///
    /// # Errors
    ///
    /// Returns an error when no path is configured and the platform data
    /// directory cannot be determined.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.path {
            return Ok(path.clone());
        }

        let proj_dirs = ProjectDirs::from("com", "roomkey", "roomkey").ok_or_else(|| {
            RoomkeyError::Storage("Could not determine data directory".to_string())
        })?;
        Ok(proj_dirs.data_dir().join("session.json"))
    }
}

/// Token refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Refresh endpoint path, relative to the API base URL
    #[serde(default = "default_refresh_path")]
    pub path: String,

    /// Whether the server must rotate the refresh token
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            path: default_refresh_path(),
            rotation: RotationPolicy::default(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Default level for the `roomkey` target when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RoomkeyError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RoomkeyError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("ROOMKEY_BASE_URL") {
            self.api.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("ROOMKEY_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.api.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid ROOMKEY_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(backend) = std::env::var("ROOMKEY_SESSION_BACKEND") {
            match backend.parse::<SessionBackendKind>() {
                Ok(kind) => self.session.backend = kind,
                Err(e) => tracing::warn!("Ignoring ROOMKEY_SESSION_BACKEND: {}", e),
            }
        }

        if let Ok(path) = std::env::var("ROOMKEY_SESSION_PATH") {
            self.session.path = Some(PathBuf::from(path));
        }

        if let Ok(rotation) = std::env::var("ROOMKEY_REFRESH_ROTATION") {
            self.refresh.rotation = match rotation.to_lowercase().as_str() {
                "optional" => RotationPolicy::Optional,
                "required" => RotationPolicy::Required,
                _ => {
                    tracing::warn!("Invalid ROOMKEY_REFRESH_ROTATION: {}", rotation);
                    self.refresh.rotation
                }
            };
        }

        if let Ok(json) = std::env::var("ROOMKEY_LOG_JSON") {
            self.logging.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(ref base_url) = cli.base_url {
            self.api.base_url = base_url.clone();
        }

        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url()?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RoomkeyError::Config(format!(
                "api.base_url must use http or https, got: {}",
                base_url.scheme()
            ))
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(RoomkeyError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.api.timeout_seconds > 600 {
            return Err(RoomkeyError::Config(
                "api.timeout_seconds must be less than or equal to 600".to_string(),
            )
            .into());
        }

        if !self.refresh.path.starts_with('/') {
            return Err(
                RoomkeyError::Config("refresh.path must start with '/'".to_string()).into(),
            );
        }

        if self.session.backend == SessionBackendKind::Keyring
            && self.session.keyring_service.trim().is_empty()
        {
            return Err(RoomkeyError::Config(
                "session.keyring_service cannot be empty".to_string(),
            )
            .into());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(RoomkeyError::Config(format!(
                "Invalid logging.level: {}. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ))
            .into());
        }

        Ok(())
    }

    /// Parsed API base URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `api.base_url` is not a URL.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.api.base_url).map_err(|e| {
            RoomkeyError::Config(format!("Invalid api.base_url '{}': {}", self.api.base_url, e))
                .into()
        })
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    /// Settings for the refresh coordinator.
    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            refresh_path: self.refresh.path.clone(),
            rotation: self.refresh.rotation,
        }
    }
}
