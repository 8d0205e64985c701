//! Individual capability queries
//!
//! Each query answers with a [`Presence`] instead of an error: a missing
//! binary, a refused connection or a failed write are all just facts
//! about the host.

use super::Presence;
use reqwest::Client;
use semver::Version;
use serde::Deserialize;
use std::ffi::OsStr;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Probe file written to test directory writability
const WRITE_PROBE_FILE: &str = ".omniboot_probe";

/// Manifests that mark the project as dependency-managed
pub const MANIFEST_FILES: &[&str] = &["pyproject.toml", "requirements.txt", "poetry.lock"];

/// Look up an executable on the search path.
///
/// `search_path` replaces `$PATH` when given.
pub fn executable(binary: &str, search_path: Option<&OsStr>, cwd: &Path) -> (Presence, Option<String>) {
    let found = match search_path {
        Some(paths) => which::which_in(binary, Some(paths), cwd),
        None => which::which(binary),
    };

    match found {
        Ok(path) => (Presence::present(), Some(path.display().to_string())),
        Err(e) => {
            debug!("{} not found on search path: {}", binary, e);
            (Presence::Absent, None)
        }
    }
}

/// Run `<program> --version` and compare the result with `minimum`.
pub async fn runtime_version(
    program: &Path,
    minimum: &Version,
    limit: Duration,
) -> (Presence, Option<String>) {
    let mut cmd = Command::new(program);
    cmd.arg("--version").kill_on_drop(true);

    let output = match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("{} --version failed to run: {}", program.display(), e);
            return (Presence::Absent, None);
        }
        Err(_) => {
            return (
                Presence::unknown(format!("version check timed out after {}ms", limit.as_millis())),
                None,
            )
        }
    };

    if !output.status.success() {
        return (Presence::Absent, Some("--version exited with failure".to_string()));
    }

    // Older interpreters print the banner on stderr
    let text = format!(
        "{} {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    match parse_version_text(&text) {
        Some(version) if version >= *minimum => (Presence::versioned(version.to_string()), None),
        Some(version) => (
            Presence::Absent,
            Some(format!("{} is older than required {}", version, minimum)),
        ),
        None => (
            Presence::unknown("unrecognized version output"),
            Some(text.trim().to_string()),
        ),
    }
}

/// Extract the first dotted version number from free-form text.
///
/// Lenient on purpose: `Python 3.12.0rc1` parses as `3.12.0`, `3.9` as
/// `3.9.0`.
pub fn parse_version_text(text: &str) -> Option<Version> {
    text.split_whitespace().find_map(|word| {
        let word = word.trim_start_matches('v');
        if !word.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        let mut parts = word.split('.').map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        });

        let major = parts.next()??;
        let minor = parts.next().flatten();
        let patch = parts.next().flatten();

        // A bare integer is not a version
        minor.map(|minor| Version::new(major, minor, patch.unwrap_or(0)))
    })
}

/// Directory exists and a file can be created inside it
pub fn directory_writable(path: &Path) -> (Presence, Option<String>) {
    if !path.exists() {
        return (Presence::Absent, Some("missing".to_string()));
    }
    if !path.is_dir() {
        return (Presence::Absent, Some("not a directory".to_string()));
    }

    let probe = path.join(WRITE_PROBE_FILE);
    match std::fs::write(&probe, "probe") {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            (Presence::present(), None)
        }
        Err(e) => (Presence::Absent, Some(format!("not writable: {}", e))),
    }
}

/// TCP connect to `host:port` within `limit`
pub async fn port_reachable(host: &str, port: u16, limit: Duration) -> Presence {
    let addr = format!("{}:{}", host, port);
    match timeout(limit, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => Presence::present(),
        Ok(Err(e)) => {
            debug!("{} not reachable: {}", addr, e);
            Presence::Absent
        }
        Err(_) => Presence::unknown(format!("connect to {} timed out", addr)),
    }
}

/// First manifest file found in `root`
pub fn package_manifest(root: &Path) -> (Presence, Option<String>) {
    MANIFEST_FILES
        .iter()
        .find(|name| root.join(name).is_file())
        .map(|name| (Presence::present(), Some(name.to_string())))
        .unwrap_or((Presence::Absent, None))
}

/// Ports in `[start, start + count)` that can currently be bound on loopback
pub fn free_ports(start: u16, count: u16) -> Vec<u16> {
    (start..start.saturating_add(count))
        .filter(|port| TcpListener::bind(("127.0.0.1", *port)).is_ok())
        .collect()
}

/// An HTTP server on loopback `port` answers `path` with a success status
pub async fn app_answering(client: &Client, port: u16, path: &str) -> bool {
    let url = format!("http://127.0.0.1:{}{}", port, path);
    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!("{} did not answer: {}", url, e);
            false
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

/// Models installed in the inference daemon; empty when it cannot be asked
pub async fn installed_models(client: &Client, base_url: &str) -> Vec<String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));

    let response = match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            debug!("model listing returned {}", response.status());
            return Vec::new();
        }
        Err(e) => {
            debug!("model listing failed: {}", e);
            return Vec::new();
        }
    };

    match response.json::<TagsResponse>().await {
        Ok(tags) => tags.models.into_iter().map(|m| m.name).collect(),
        Err(e) => {
            debug!("model listing unparseable: {}", e);
            Vec::new()
        }
    }
}
