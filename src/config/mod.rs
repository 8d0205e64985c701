//! Runtime configuration
//!
//! Three layers, highest priority first:
//! 1. [`Overrides`] read once from the process environment
//! 2. values derived from the detected [`CapabilitySet`](crate::capability::CapabilitySet)
//! 3. [`Defaults`], compiled in and optionally adjusted by a TOML file
//!
//! The [`Synthesizer`] merges them into one read-only [`EffectiveConfig`].

pub mod defaults;
pub mod overrides;
pub mod synthesizer;

pub use defaults::Defaults;
pub use overrides::Overrides;
pub use synthesizer::Synthesizer;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Retry parameters for one managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub probe_timeout_ms: u64,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    /// Restart the app server on source changes
    pub reload: bool,
}

impl ServerSettings {
    /// Loopback URL of the app server's health endpoint
    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, health_path(&self.api_prefix))
    }
}

/// Health endpoint path under an API prefix
pub fn health_path(api_prefix: &str) -> String {
    format!("{}/health", api_prefix.trim_end_matches('/'))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub enabled: bool,
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub raw_data: PathBuf,
    pub processed_data: PathBuf,
    pub sample_dataset: PathBuf,
    pub models_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config_file: PathBuf,
}

impl PathSettings {
    pub fn under(base: PathBuf) -> Self {
        let data_dir = base.join("data");
        Self {
            raw_data: data_dir.join("raw"),
            processed_data: data_dir.join("processed"),
            sample_dataset: data_dir.join("raw").join("data.csv"),
            models_dir: base.join("models"),
            reports_dir: base.join("reports"),
            logs_dir: base.join("logs"),
            config_file: base.join("config.yaml"),
            data_dir,
            base,
        }
    }

    /// Where the last healing pass is persisted
    pub fn healing_report(&self) -> PathBuf {
        self.logs_dir.join("last-healing.json")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub llm_reports: bool,
    pub gpu_acceleration: bool,
    pub data_versioning: bool,
    pub container_deploy: bool,
    pub overlay_network: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTable {
    pub overlay: ServiceSettings,
    pub inference: ServiceSettings,
    pub app: ServiceSettings,
    #[serde(skip_serializing, default)]
    pub overlay_auth_key: Option<String>,
}

/// Configuration for one run, read-only after synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectSettings,
    pub server: ServerSettings,
    pub inference: InferenceSettings,
    pub paths: PathSettings,
    pub features: FeatureFlags,
    pub services: ServiceTable,
    pub environment: String,
    pub startup_timeout_secs: u64,
    /// Recognized override keys whose values could not be used
    pub ignored_overrides: Vec<String>,
}

impl EffectiveConfig {
    pub fn to_pretty_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
