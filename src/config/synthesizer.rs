//! Config synthesis
//!
//! `synthesize` is a pure function of (root, defaults, capabilities,
//! overrides): no I/O, no clock, no environment reads. The same inputs
//! always serialize to the same bytes.

use super::{
    Defaults, EffectiveConfig, FeatureFlags, InferenceSettings, Overrides, PathSettings,
    ProjectSettings, ServerSettings, ServiceSettings, ServiceTable,
};
use crate::capability::{names, CapabilitySet};
use std::path::PathBuf;

/// Merges overrides, capability-derived values and defaults
#[derive(Debug, Clone)]
pub struct Synthesizer {
    root: PathBuf,
    defaults: Defaults,
}

impl Synthesizer {
    pub fn new(root: impl Into<PathBuf>, defaults: Defaults) -> Self {
        Self {
            root: root.into(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Produce the effective configuration for this run
    pub fn synthesize(&self, caps: &CapabilitySet, overrides: &Overrides) -> EffectiveConfig {
        let d = &self.defaults;
        let mut rejected = Vec::new();

        let environment = overrides
            .text("environment")
            .unwrap_or_else(|| d.environment.clone());

        let server = ServerSettings {
            host: overrides.text("host").unwrap_or_else(|| d.server.host.clone()),
            port: overrides
                .positive::<u16>("port", &mut rejected)
                .or(caps.facts().running_app_port)
                .or_else(|| caps.facts().free_ports.first().copied())
                .unwrap_or(d.server.port),
            api_prefix: overrides
                .text("api_prefix")
                .unwrap_or_else(|| d.server.api_prefix.clone()),
            reload: environment == "development",
        };

        let inference = self.inference(caps, overrides, &mut rejected);

        let features = FeatureFlags {
            llm_reports: inference.enabled,
            gpu_acceleration: caps.has(names::GPU),
            data_versioning: caps.has(names::VERSIONED_DATA_STORE),
            container_deploy: caps.has(names::CONTAINER_RUNTIME),
            overlay_network: overrides
                .flag("overlay_enabled", &mut rejected)
                .unwrap_or_else(|| caps.has(names::OVERLAY_NETWORK_CLIENT)),
        };

        let services = ServiceTable {
            overlay: service_settings("overlay", d.services.overlay, overrides, &mut rejected),
            inference: service_settings("inference", d.services.inference, overrides, &mut rejected),
            app: service_settings("app", d.services.app, overrides, &mut rejected),
            overlay_auth_key: overrides.text("overlay_auth_key"),
        };

        let startup_timeout_secs = overrides
            .positive::<u64>("startup_timeout_secs", &mut rejected)
            .unwrap_or(d.startup_timeout_secs);

        rejected.sort();
        rejected.dedup();

        EffectiveConfig {
            project: ProjectSettings {
                name: d.project.name.clone(),
                version: d.project.version.clone(),
            },
            server,
            inference,
            paths: PathSettings::under(self.root.clone()),
            features,
            services,
            environment,
            startup_timeout_secs,
            ignored_overrides: rejected,
        }
    }

    fn inference(
        &self,
        caps: &CapabilitySet,
        overrides: &Overrides,
        rejected: &mut Vec<String>,
    ) -> InferenceSettings {
        let d = &self.defaults.inference;

        let enabled = overrides
            .flag("llm_enabled", rejected)
            .unwrap_or_else(|| caps.has(names::INFERENCE_DAEMON));

        let model = overrides
            .text("model")
            .or_else(|| caps.facts().installed_models.first().cloned())
            .unwrap_or_else(|| d.model.clone());

        InferenceSettings {
            enabled,
            provider: if enabled { "ollama" } else { "none" }.to_string(),
            base_url: overrides
                .text("inference_url")
                .unwrap_or_else(|| d.base_url.clone()),
            model,
            temperature: d.temperature,
            max_tokens: d.max_tokens,
            notice: (!enabled).then(|| "LLM features disabled - inference daemon not available".to_string()),
        }
    }
}

fn service_settings(
    name: &str,
    fallback: ServiceSettings,
    overrides: &Overrides,
    rejected: &mut Vec<String>,
) -> ServiceSettings {
    let key = |field: &str| format!("{}_{}", name, field);

    ServiceSettings {
        max_attempts: overrides
            .positive::<u32>(&key("max_attempts"), rejected)
            .unwrap_or(fallback.max_attempts),
        base_delay_ms: overrides
            .parse::<u64>(&key("base_delay_ms"), rejected)
            .unwrap_or(fallback.base_delay_ms),
        probe_timeout_ms: overrides
            .positive::<u64>(&key("probe_timeout_ms"), rejected)
            .unwrap_or(fallback.probe_timeout_ms),
        optional: overrides
            .flag(&key("optional"), rejected)
            .unwrap_or(fallback.optional),
    }
}
