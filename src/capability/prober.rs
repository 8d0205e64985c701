//! Capability prober
//!
//! Runs every check in a fixed order and folds the answers into a
//! [`CapabilitySet`]. Probing cannot fail: a check that cannot be carried
//! out is recorded as `Unknown`.

use super::checks;
use super::{names, Capability, CapabilitySet, HostFacts, Presence};
use crate::healing::layout::STANDARD_DIRECTORIES;
use reqwest::{Client, Url};
use semver::Version;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::System;
use tracing::{debug, info};

/// Executable whose presence maps to a capability
#[derive(Debug, Clone)]
pub struct ToolCheck {
    pub capability: String,
    pub binary: String,
}

impl ToolCheck {
    pub fn new(capability: &str, binary: &str) -> Self {
        Self {
            capability: capability.to_string(),
            binary: binary.to_string(),
        }
    }
}

/// What to probe and where
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Project root
    pub root: PathBuf,
    /// Replaces `$PATH` for executable lookups when set
    pub search_path: Option<OsString>,
    pub tools: Vec<ToolCheck>,
    /// Scripting runtime executable
    pub runtime: String,
    pub runtime_minimum: Version,
    /// Directories expected under the root, relative paths
    pub expected_dirs: Vec<String>,
    /// Base URL of the local inference daemon
    pub inference_url: String,
    pub port_scan_start: u16,
    pub port_scan_count: u16,
    /// Health path of the app server, checked on busy scan-range ports
    pub app_health_path: String,
    /// Upper bound for any single check
    pub check_timeout: Duration,
}

impl ProbeSettings {
    /// Standard checks for a project rooted at `root`
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            search_path: None,
            tools: vec![
                ToolCheck::new(names::CONTAINER_RUNTIME, "docker"),
                ToolCheck::new(names::OVERLAY_NETWORK_CLIENT, "tailscale"),
                ToolCheck::new(names::INFERENCE_DAEMON, "ollama"),
                ToolCheck::new(names::VERSIONED_DATA_STORE, "dvc"),
                ToolCheck::new(names::VERSION_CONTROL, "git"),
                ToolCheck::new(names::GPU, "nvidia-smi"),
            ],
            runtime: "python3".to_string(),
            runtime_minimum: Version::new(3, 9, 0),
            expected_dirs: STANDARD_DIRECTORIES.iter().map(|d| d.to_string()).collect(),
            inference_url: "http://127.0.0.1:11434".to_string(),
            port_scan_start: 8000,
            port_scan_count: 10,
            app_health_path: "/v1/health".to_string(),
            check_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_inference_url(mut self, url: impl Into<String>) -> Self {
        self.inference_url = url.into();
        self
    }

    pub fn with_app_health_path(mut self, path: impl Into<String>) -> Self {
        self.app_health_path = path.into();
        self
    }

    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }
}

/// Host capability prober
pub struct Prober {
    settings: ProbeSettings,
    client: Client,
}

impl Prober {
    /// Create a new prober
    pub fn new(settings: ProbeSettings) -> Self {
        let client = Client::builder()
            .timeout(settings.check_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { settings, client }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Run every check and return the capability set
    pub async fn probe(&self) -> CapabilitySet {
        let s = &self.settings;
        let mut found = Vec::new();

        for tool in &s.tools {
            found.push(self.check_tool(&tool.capability, &tool.binary));
        }

        found.push(self.check_runtime().await);

        let endpoint = self.check_inference_endpoint().await;
        let endpoint_up = endpoint.presence.is_present();
        found.push(endpoint);

        let (presence, detail) = checks::package_manifest(&s.root);
        found.push(with_optional_detail(
            Capability::new(names::PACKAGE_MANIFEST, presence),
            detail,
        ));

        let (presence, detail) = checks::directory_writable(&s.root);
        found.push(with_optional_detail(
            Capability::new(names::WORKSPACE_WRITABLE, presence),
            detail,
        ));

        for dir in &s.expected_dirs {
            let (presence, detail) = checks::directory_writable(&s.root.join(dir));
            found.push(with_optional_detail(
                Capability::new(names::directory(dir), presence),
                detail,
            ));
        }

        let installed_models = if endpoint_up {
            checks::installed_models(&self.client, &s.inference_url).await
        } else {
            Vec::new()
        };

        let mut facts = host_facts(s.port_scan_start, s.port_scan_count);
        facts.installed_models = installed_models;
        facts.running_app_port = self.running_app_port(&facts.free_ports).await;

        let set = CapabilitySet::from_parts(found, facts);
        info!(
            "Probed {} capabilities ({} present)",
            set.len(),
            set.iter().filter(|c| c.presence.is_present()).count()
        );
        set
    }

    fn check_tool(&self, capability: &str, binary: &str) -> Capability {
        let (presence, location) =
            checks::executable(binary, self.settings.search_path.as_deref(), &self.settings.root);
        debug!("{} ({}): {:?}", capability, binary, presence);
        with_optional_detail(Capability::new(capability, presence), location)
    }

    async fn check_runtime(&self) -> Capability {
        let s = &self.settings;
        let located = match &s.search_path {
            Some(paths) => which::which_in(&s.runtime, Some(paths), &s.root),
            None => which::which(&s.runtime),
        };

        let path = match located {
            Ok(path) => path,
            Err(_) => {
                return Capability::new(names::SCRIPTING_RUNTIME, Presence::Absent)
                    .with_detail(format!("{} not found", s.runtime))
            }
        };

        let (presence, detail) =
            checks::runtime_version(&path, &s.runtime_minimum, s.check_timeout).await;
        with_optional_detail(Capability::new(names::SCRIPTING_RUNTIME, presence), detail)
    }

    /// First busy port in the scan range already serving the app
    async fn running_app_port(&self, free_ports: &[u16]) -> Option<u16> {
        let s = &self.settings;
        let busy = (s.port_scan_start..s.port_scan_start.saturating_add(s.port_scan_count))
            .filter(|port| !free_ports.contains(port));

        for port in busy {
            if checks::app_answering(&self.client, port, &s.app_health_path).await {
                info!("App server already answering on port {}", port);
                return Some(port);
            }
        }
        None
    }

    async fn check_inference_endpoint(&self) -> Capability {
        let url = &self.settings.inference_url;
        match endpoint_address(url) {
            Some((host, port)) => {
                let presence = checks::port_reachable(&host, port, self.settings.check_timeout).await;
                Capability::new(names::INFERENCE_ENDPOINT, presence)
                    .with_detail(format!("{}:{}", host, port))
            }
            None => Capability::new(
                names::INFERENCE_ENDPOINT,
                Presence::unknown(format!("unparseable endpoint {}", url)),
            ),
        }
    }
}

fn with_optional_detail(capability: Capability, detail: Option<String>) -> Capability {
    match detail {
        Some(detail) => capability.with_detail(detail),
        None => capability,
    }
}

/// Host and port of an HTTP base URL
pub fn endpoint_address(url: &str) -> Option<(String, u16)> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_string();
    let port = parsed.port_or_known_default()?;
    Some((host, port))
}

fn host_facts(port_scan_start: u16, port_scan_count: u16) -> HostFacts {
    let sys = System::new_all();

    HostFacts {
        platform: System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
        cpu_count: sys.cpus().len(),
        total_memory_mb: sys.total_memory() / (1024 * 1024),
        free_ports: checks::free_ports(port_scan_start, port_scan_count),
        ..HostFacts::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_endpoint_address() {
        assert_eq!(
            endpoint_address("http://127.0.0.1:11434"),
            Some(("127.0.0.1".to_string(), 11434))
        );
        assert_eq!(
            endpoint_address("http://localhost"),
            Some(("localhost".to_string(), 80))
        );
        assert_eq!(endpoint_address("not a url"), None);
    }

    #[test]
    fn test_default_settings_cover_standard_tools() {
        let settings = ProbeSettings::for_root("/tmp/project");
        let capabilities: Vec<&str> = settings.tools.iter().map(|t| t.capability.as_str()).collect();
        assert!(capabilities.contains(&names::INFERENCE_DAEMON));
        assert!(capabilities.contains(&names::OVERLAY_NETWORK_CLIENT));
        assert!(capabilities.contains(&names::CONTAINER_RUNTIME));
        assert_eq!(settings.runtime_minimum, Version::new(3, 9, 0));
    }

    #[tokio::test]
    async fn test_probe_on_bare_host_never_fails() {
        let root = TempDir::new().unwrap();
        let empty_path = TempDir::new().unwrap();

        // Nothing listens on port 9 of loopback in test environments
        let settings = ProbeSettings::for_root(root.path())
            .with_search_path(empty_path.path().as_os_str())
            .with_inference_url("http://127.0.0.1:9");

        let caps = Prober::new(settings).probe().await;

        assert!(!caps.has(names::INFERENCE_DAEMON));
        assert!(!caps.has(names::CONTAINER_RUNTIME));
        assert!(!caps.has(names::SCRIPTING_RUNTIME));
        assert!(!caps.has(names::INFERENCE_ENDPOINT));
        assert!(!caps.has(names::PACKAGE_MANIFEST));
        assert!(caps.has(names::WORKSPACE_WRITABLE));
        assert!(!caps.has(&names::directory("data/raw")));
        assert!(caps.facts().installed_models.is_empty());
    }

    #[tokio::test]
    async fn test_probe_sees_existing_directories() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("models")).unwrap();
        let empty_path = TempDir::new().unwrap();

        let settings = ProbeSettings::for_root(root.path())
            .with_search_path(empty_path.path().as_os_str())
            .with_inference_url("http://127.0.0.1:9");
        let caps = Prober::new(settings).probe().await;

        assert!(caps.has(&names::directory("models")));
        assert!(!caps.has(&names::directory("logs")));
    }
}
