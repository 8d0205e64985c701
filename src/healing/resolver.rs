//! Dependency resolution through the scripting runtime

use crate::capability::Presence;
use crate::errors::{OrchestratorError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

/// Answers "is this module importable?" and installs packages
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    async fn is_importable(&self, module: &str) -> Presence;

    async fn install(&self, package: &str) -> Result<()>;
}

/// Resolver backed by a Python-style interpreter and its package installer
#[derive(Debug, Clone)]
pub struct RuntimeResolver {
    interpreter: String,
    check_timeout: Duration,
    install_timeout: Duration,
}

impl RuntimeResolver {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            check_timeout: Duration::from_secs(10),
            install_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeouts(mut self, check: Duration, install: Duration) -> Self {
        self.check_timeout = check;
        self.install_timeout = install;
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

impl Default for RuntimeResolver {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl DependencyResolver for RuntimeResolver {
    async fn is_importable(&self, module: &str) -> Presence {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c")
            .arg(format!("import {}", module))
            .kill_on_drop(true);

        match timeout(self.check_timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => Presence::present(),
            Ok(Ok(_)) => Presence::Absent,
            Ok(Err(e)) => Presence::unknown(format!("cannot run {}: {}", self.interpreter, e)),
            Err(_) => Presence::unknown(format!(
                "import check timed out after {}s",
                self.check_timeout.as_secs()
            )),
        }
    }

    async fn install(&self, package: &str) -> Result<()> {
        info!("Installing {} with {} -m pip", package, self.interpreter);
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(["-m", "pip", "install", package]).kill_on_drop(true);

        let output = timeout(self.install_timeout, cmd.output())
            .await
            .map_err(|_| OrchestratorError::Timeout {
                duration_ms: self.install_timeout.as_millis() as u64,
            })??;

        if output.status.success() {
            debug!("{} installed", package);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("no output").trim().to_string();
            Err(OrchestratorError::Generic(format!(
                "pip install {} exited with {}: {}",
                package,
                output.status.code().unwrap_or(-1),
                last_line
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_interpreter_is_unknown() {
        let resolver = RuntimeResolver::new("/nonexistent/interpreter-for-tests");
        let presence = resolver.is_importable("os").await;
        assert!(matches!(presence, Presence::Unknown { .. }));
    }

    #[tokio::test]
    async fn test_install_with_missing_interpreter_fails() {
        let resolver = RuntimeResolver::new("/nonexistent/interpreter-for-tests");
        assert!(resolver.install("fastapi").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_install_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("installed");
        let interpreter = dir.path().join("slow-python");
        std::fs::write(
            &interpreter,
            format!("#!/bin/sh\nsleep 1\ntouch {}\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&interpreter, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolver = RuntimeResolver::new(interpreter.display().to_string())
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(100));
        let result = resolver.install("fastapi").await;
        assert!(matches!(result, Err(OrchestratorError::Timeout { .. })));

        // A surviving installer would have finished by now
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn test_default_interpreter() {
        assert_eq!(RuntimeResolver::default().interpreter(), "python3");
    }
}
