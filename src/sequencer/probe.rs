//! Health probes
//!
//! A probe answers "is the service healthy right now?" once. It does not
//! retry; the sequencer owns the retry budget and the per-call timeout.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;

/// Why a probe did not report healthy
pub type ProbeResult = std::result::Result<(), String>;

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ProbeResult;

    /// Short description for logs, e.g. `GET http://127.0.0.1:8000/v1/health`
    fn describe(&self) -> String;
}

/// Healthy when a GET returns a 2xx status; the body is ignored
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> ProbeResult {
        debug!("HTTP health check: {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", response.status()))
        }
    }

    fn describe(&self) -> String {
        format!("GET {}", self.url)
    }
}

/// Healthy when a TCP connection can be opened
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn check(&self) -> ProbeResult {
        debug!("TCP health check: {}:{}", self.host, self.port);
        TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn describe(&self) -> String {
        format!("tcp {}:{}", self.host, self.port)
    }
}

/// Healthy when the command exits with status 0
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl HealthProbe for CommandProbe {
    async fn check(&self) -> ProbeResult {
        debug!("Command health check: {} {:?}", self.program, self.args);
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("cannot run {}: {}", self.program, e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim();
            Err(format!(
                "{} exited with {}{}",
                self.program,
                output.status.code().unwrap_or(-1),
                if last_line.is_empty() {
                    String::new()
                } else {
                    format!(": {}", last_line)
                }
            ))
        }
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Run `probe` bounded by `limit`; a timeout counts as unhealthy
pub async fn check_within(probe: &dyn HealthProbe, limit: Duration) -> ProbeResult {
    match tokio::time::timeout(limit, probe.check()).await {
        Ok(result) => result,
        Err(_) => Err(format!("probe timed out after {}ms", limit.as_millis())),
    }
}
