//! Compiled-in fallback settings
//!
//! Optionally adjusted by a TOML file.
//! Location: ~/.omniboot/config.toml (or `--config <path>`)

use super::ServiceSettings;
use crate::errors::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fallback layer for every synthesized setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub project: ProjectDefaults,
    pub server: ServerDefaults,
    pub inference: InferenceDefaults,
    pub services: ServiceDefaults,
    pub environment: String,
    pub startup_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDefaults {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerDefaults {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceDefaults {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDefaults {
    pub overlay: ServiceSettings,
    pub inference: ServiceSettings,
    pub app: ServiceSettings,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            project: ProjectDefaults::default(),
            server: ServerDefaults::default(),
            inference: InferenceDefaults::default(),
            services: ServiceDefaults::default(),
            environment: "development".to_string(),
            startup_timeout_secs: 300,
        }
    }
}

impl Default for ProjectDefaults {
    fn default() -> Self {
        Self {
            name: "omnitide-ai-suite".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_prefix: "/v1".to_string(),
        }
    }
}

impl Default for InferenceDefaults {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "phi3:mini".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            overlay: ServiceSettings {
                max_attempts: 5,
                base_delay_ms: 1000,
                probe_timeout_ms: 3000,
                optional: true,
            },
            inference: ServiceSettings {
                max_attempts: 8,
                base_delay_ms: 500,
                probe_timeout_ms: 2000,
                optional: true,
            },
            app: ServiceSettings {
                max_attempts: 10,
                base_delay_ms: 500,
                probe_timeout_ms: 2000,
                optional: false,
            },
        }
    }
}

impl Defaults {
    /// Load defaults from file or use built-in values
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load defaults from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::ConfigError(format!("Failed to read config: {}", e)))?;

        let defaults: Defaults = toml::from_str(&contents)
            .map_err(|e| OrchestratorError::ConfigError(format!("Failed to parse config: {}", e)))?;

        defaults.validate()?;
        Ok(defaults)
    }

    /// Load from the standard location when present
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::standard_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Defaults::default())
    }

    pub fn standard_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".omniboot").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(OrchestratorError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if !self.server.api_prefix.is_empty() && !self.server.api_prefix.starts_with('/') {
            return Err(OrchestratorError::ConfigError(format!(
                "server.api_prefix must start with '/': {}",
                self.server.api_prefix
            )));
        }

        if !(0.0..=2.0).contains(&self.inference.temperature) {
            return Err(OrchestratorError::ConfigError(
                "inference.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        for (name, service) in [
            ("overlay", &self.services.overlay),
            ("inference", &self.services.inference),
            ("app", &self.services.app),
        ] {
            if service.max_attempts == 0 {
                return Err(OrchestratorError::ConfigError(format!(
                    "services.{}.max_attempts must be at least 1",
                    name
                )));
            }
            if service.probe_timeout_ms == 0 {
                return Err(OrchestratorError::ConfigError(format!(
                    "services.{}.probe_timeout_ms must be greater than 0",
                    name
                )));
            }
        }

        if self.startup_timeout_secs == 0 {
            return Err(OrchestratorError::ConfigError(
                "startup_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save defaults to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| OrchestratorError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OrchestratorError::ConfigError(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| OrchestratorError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
