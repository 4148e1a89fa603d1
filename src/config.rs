//! Configuration management for duoroute
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Endpoint localities are validated here, before any router exists.

use crate::error::{AppError, AppResult};
use crate::models::endpoint::default_base_url;
use crate::models::{Endpoint, GenerationParams, Locality, Role};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `backend.timeout_seconds`
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub primary: EndpointConfig,
    pub secondary: EndpointConfig,
    #[serde(default)]
    pub generation: GenerationParams,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// One endpoint of the failover pair
///
/// Fields are private; validation happens in `Config::validate()` and the
/// typed [`Endpoint`] is produced by [`EndpointConfig::to_endpoint`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    locality: String,
    model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
}

impl EndpointConfig {
    pub fn locality(&self) -> &str {
        &self.locality
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Configured base URL, if any
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Same endpoint serving a different model
    ///
    /// Used for the CLI's model override; the result must be re-validated.
    pub fn with_model(self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self
        }
    }

    /// Build the typed endpoint for `role`
    ///
    /// # Errors
    /// Returns `AppError::InvalidLocality` if the locality is unknown.
    pub fn to_endpoint(&self, role: Role) -> AppResult<Endpoint> {
        let locality = Locality::parse(&self.locality)?;
        let base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(&locality));
        Ok(Endpoint::new(role, locality, self.model.clone(), base_url))
    }

    fn validate(&self, role: Role) -> AppResult<()> {
        Locality::parse(&self.locality)?;

        if self.model.trim().is_empty() {
            return Err(AppError::Config(format!(
                "{}.model must not be empty",
                role
            )));
        }

        if let Some(url) = &self.base_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "{}.base_url '{}' must start with 'http://' or 'https://'",
                role, url
            )));
        }

        Ok(())
    }
}

/// Backend transport settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Per-call deadline in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Name of the environment variable holding a bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            api_key_env: None,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Read the bearer token from the configured environment variable
    ///
    /// Returns `None` when no variable is configured or it is unset.
    pub fn api_key(&self) -> Option<String> {
        let name = self.api_key_env.as_deref()?;
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => {
                tracing::warn!(
                    api_key_env = %name,
                    "Configured API key variable is unset or empty, sending unauthenticated requests"
                );
                None
            }
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Unknown localities surface as `AppError::InvalidLocality`; every
    /// other validation failure is reported with the file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config.validate().map_err(|e| match e {
            AppError::InvalidLocality { .. } => e,
            other => AppError::ConfigValidationFailed {
                path: path_display,
                reason: other.to_string(),
            },
        })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()` and `from_str()`, and
    /// must be called again after modifying a parsed config.
    pub fn validate(&self) -> AppResult<()> {
        self.primary.validate(Role::Primary)?;
        self.secondary.validate(Role::Secondary)?;
        self.generation.validate()?;

        if self.backend.timeout_seconds == 0 {
            return Err(AppError::Config(
                "backend.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.backend.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "backend.timeout_seconds cannot exceed {} seconds, got {}",
                MAX_TIMEOUT_SECONDS, self.backend.timeout_seconds
            )));
        }

        Ok(())
    }

    /// Typed primary and secondary endpoints
    pub fn endpoints(&self) -> AppResult<(Endpoint, Endpoint)> {
        Ok((
            self.primary.to_endpoint(Role::Primary)?,
            self.secondary.to_endpoint(Role::Secondary)?,
        ))
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
