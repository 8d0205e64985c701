//! Start procedures
//!
//! Starting a service means launching it, not waiting for it: readiness is
//! established afterwards by the probe.

use crate::errors::{OrchestratorError, Result};
use async_trait::async_trait;
use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

#[async_trait]
pub trait StartProcedure: Send + Sync {
    async fn start(&self) -> Result<()>;

    fn describe(&self) -> String;
}

/// Shown in place of secret arguments
pub const REDACTED: &str = "<redacted>";

/// Spawns a detached background process
#[derive(Clone)]
pub struct CommandStart {
    program: String,
    args: Vec<String>,
    /// Indices into `args` that must never be rendered
    secret_args: Vec<usize>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    log_file: Option<PathBuf>,
}

impl CommandStart {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            secret_args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            log_file: None,
        }
    }

    /// Append `flag value`; the value is passed to the process but redacted
    /// from `describe()` and `Debug`
    pub fn secret_arg(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push(flag.into());
        self.secret_args.push(self.args.len());
        self.args.push(value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Append stdout and stderr to `path` instead of discarding them
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn output_sinks(&self) -> Result<(Stdio, Stdio)> {
        match &self.log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                let stderr = file.try_clone()?;
                Ok((Stdio::from(file), Stdio::from(stderr)))
            }
            None => Ok((Stdio::null(), Stdio::null())),
        }
    }
}

#[async_trait]
impl StartProcedure for CommandStart {
    async fn start(&self) -> Result<()> {
        let (stdout, stderr) = self.output_sinks()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| {
            OrchestratorError::Generic(format!("failed to spawn {}: {}", self.program, e))
        })?;

        info!(
            "Launched {} (pid {})",
            self.describe(),
            child.id().map(|id| id.to_string()).unwrap_or_else(|| "?".to_string())
        );
        if let Some(path) = &self.log_file {
            debug!("Output of {} goes to {}", self.program, path.display());
        }

        // The service outlives this handle; health is judged by the probe
        drop(child);
        Ok(())
    }

    fn describe(&self) -> String {
        let shown: Vec<&str> = self
            .args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                if self.secret_args.contains(&i) {
                    REDACTED
                } else {
                    arg.as_str()
                }
            })
            .collect();

        if shown.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, shown.join(" "))
        }
    }
}

impl fmt::Debug for CommandStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStart")
            .field("command", &self.describe())
            .field("cwd", &self.cwd)
            .field("envs", &self.envs.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("log_file", &self.log_file)
            .finish()
    }
}

/// For services managed outside the orchestrator: only the probe matters
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStart;

#[async_trait]
impl StartProcedure for NoopStart {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "externally managed".to_string()
    }
}
