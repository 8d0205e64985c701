//! Capability detection
//!
//! A [`CapabilitySet`] is the read-only answer to "what does this host
//! actually have?". It is rebuilt from scratch on every run by the
//! [`Prober`] and consumed by the config synthesizer.

pub mod checks;
pub mod prober;

pub use prober::{ProbeSettings, Prober, ToolCheck};

use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known capability names
pub mod names {
    pub const CONTAINER_RUNTIME: &str = "container-runtime";
    pub const OVERLAY_NETWORK_CLIENT: &str = "overlay-network-client";
    pub const INFERENCE_DAEMON: &str = "inference-daemon";
    pub const INFERENCE_ENDPOINT: &str = "inference-endpoint";
    pub const VERSIONED_DATA_STORE: &str = "versioned-data-store";
    pub const VERSION_CONTROL: &str = "version-control";
    pub const GPU: &str = "gpu";
    pub const SCRIPTING_RUNTIME: &str = "scripting-runtime";
    pub const PACKAGE_MANIFEST: &str = "package-manifest";
    pub const WORKSPACE_WRITABLE: &str = "workspace-writable";

    /// Capability name for an expected working directory
    pub fn directory(relative: &str) -> String {
        format!("dir:{}", relative)
    }
}

/// Tri-state result of a single capability query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Presence {
    Present { version: Option<String> },
    Absent,
    /// The check itself could not be carried out
    Unknown { reason: String },
}

impl Presence {
    pub fn present() -> Self {
        Presence::Present { version: None }
    }

    pub fn versioned(version: impl Into<String>) -> Self {
        Presence::Present {
            version: Some(version.into()),
        }
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Presence::Unknown {
            reason: reason.into(),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Presence::Present { .. })
    }
}

/// One detected fact about the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub presence: Presence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>, presence: Presence) -> Self {
        Self {
            name: name.into(),
            presence,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Host-level facts that are not simple present/absent answers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    pub platform: String,
    pub cpu_count: usize,
    pub total_memory_mb: u64,
    /// Ports in the scan range that could be bound, ascending
    pub free_ports: Vec<u16>,
    /// Busy scan-range port where an app server already answers its health URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_app_port: Option<u16>,
    /// Models reported by the inference daemon, in daemon order
    pub installed_models: Vec<String>,
}

/// Immutable set of capabilities detected for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: BTreeMap<String, Capability>,
    facts: HostFacts,
}

impl CapabilitySet {
    /// Assemble a set from individual check results
    pub fn from_parts(capabilities: Vec<Capability>, facts: HostFacts) -> Self {
        let capabilities = capabilities
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        Self { capabilities, facts }
    }

    /// Builder-style addition, replacing an entry of the same name
    pub fn with(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability.name.clone(), capability);
        self
    }

    /// Builder-style replacement of the host facts
    pub fn with_facts(mut self, facts: HostFacts) -> Self {
        self.facts = facts;
        self
    }

    /// True only when the capability was positively detected
    pub fn has(&self, name: &str) -> bool {
        self.capabilities
            .get(name)
            .map(|c| c.presence.is_present())
            .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    pub fn version(&self, name: &str) -> Option<&str> {
        match self.capabilities.get(name).map(|c| &c.presence) {
            Some(Presence::Present { version: Some(v) }) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn facts(&self) -> &HostFacts {
        &self.facts
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.values()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Human-readable capability table
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{:<28} {}\n", "Capability", "Status"));
        out.push_str(&format!("{}\n", "=".repeat(56)));

        for cap in self.capabilities.values() {
            let status = match &cap.presence {
                Presence::Present { version: Some(v) } => format!("present ({})", v).green(),
                Presence::Present { version: None } => "present".to_string().green(),
                Presence::Absent => "absent".to_string().yellow(),
                Presence::Unknown { reason } => format!("unknown: {}", reason).red(),
            };
            match &cap.detail {
                Some(detail) => out.push_str(&format!(
                    "{:<28} {} {}\n",
                    cap.name,
                    status,
                    format!("[{}]", detail).dimmed()
                )),
                None => out.push_str(&format!("{:<28} {}\n", cap.name, status)),
            }
        }

        out.push_str(&format!(
            "\nplatform: {}, cpus: {}, memory: {} MB, free ports: {:?}\n",
            self.facts.platform, self.facts.cpu_count, self.facts.total_memory_mb, self.facts.free_ports
        ));
        if let Some(port) = self.facts.running_app_port {
            out.push_str(&format!("app server already running on port {}\n", port));
        }
        if !self.facts.installed_models.is_empty() {
            out.push_str(&format!(
                "installed models: {}\n",
                self.facts.installed_models.join(", ")
            ));
        }
        out
    }
}
