//! Terminal handoffs
//!
//! Once the dispatcher reaches `HandedOff`, control goes to exactly one of
//! these and the process ends when it returns.

use super::interactive;
use super::tasks::{AgentTask, TaskOutput};
use super::{DispatchState, Invocation, RunMode};
use crate::errors::{OrchestratorError, Result};
use crate::healing::HealingReport;
use crate::orchestrator::{Orchestrator, Startup};
use crate::sequencer::probe::check_within;
use crate::sequencer::ServiceSpec;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often `serve` re-probes running services
pub const SERVE_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// What the handoff finished with
#[derive(Debug)]
pub enum Handoff {
    /// Serve mode ended by cancellation
    Served,
    Interactive,
    AgentTask(TaskOutput),
    Healed(HealingReport),
    Passthrough { exit_code: i32 },
}

impl Handoff {
    pub fn exit_code(&self) -> i32 {
        match self {
            Handoff::AgentTask(output) if !output.success => 1,
            Handoff::Passthrough { exit_code } => *exit_code,
            _ => 0,
        }
    }
}

/// Hand control to the selected mode
pub async fn hand_off(orchestrator: &Orchestrator, startup: Startup) -> Result<Handoff> {
    let invocation = match &startup.state {
        DispatchState::HandedOff(invocation) => invocation.clone(),
        other => {
            return Err(OrchestratorError::InvalidTransition {
                from: format!("{:?}", other),
                to: "handoff".to_string(),
                reason: "startup has not reached a handoff".to_string(),
            })
        }
    };

    info!("Handing off to {}", invocation);
    match invocation {
        Invocation::Mode(RunMode::Serve) => {
            serve(&startup.services, orchestrator.cancellation()).await;
            Ok(Handoff::Served)
        }
        Invocation::Mode(RunMode::Interactive) => {
            interactive::run(orchestrator, &startup).await?;
            Ok(Handoff::Interactive)
        }
        Invocation::Mode(RunMode::AgentTask(name)) => {
            let task = AgentTask::from_name(&name)?;
            let output = TaskOutput::from_result(task, task.execute(orchestrator, &startup).await);
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(Handoff::AgentTask(output))
        }
        Invocation::Mode(RunMode::HealOnly) => {
            print!("{}", startup.healing.render());
            Ok(Handoff::Healed(startup.healing))
        }
        Invocation::Passthrough(argv) => {
            let exit_code = passthrough(&argv, &startup).await?;
            Ok(Handoff::Passthrough { exit_code })
        }
    }
}

/// Block until cancelled, logging health changes of the started services
pub async fn serve(services: &[ServiceSpec], cancel: CancellationToken) {
    serve_with_interval(services, cancel, SERVE_PROBE_INTERVAL).await
}

pub async fn serve_with_interval(
    services: &[ServiceSpec],
    cancel: CancellationToken,
    interval: Duration,
) {
    info!("Serving; press Ctrl-C to stop");
    let mut healthy: HashMap<&str, bool> = services.iter().map(|s| (s.name.as_str(), true)).collect();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        for spec in services {
            let now = check_within(spec.probe.as_ref(), spec.policy.probe_timeout).await;
            let was = healthy.insert(spec.name.as_str(), now.is_ok()).unwrap_or(true);
            match (was, now) {
                (true, Err(reason)) => warn!("{} became unhealthy: {}", spec.name, reason),
                (false, Ok(())) => info!("{} is healthy again", spec.name),
                _ => {}
            }
        }
    }

    info!("Shutting down");
}

/// Run `argv` with inherited stdio; the child's exit code becomes ours
pub async fn passthrough(argv: &[String], startup: &Startup) -> Result<i32> {
    let Some((program, args)) = argv.split_first() else {
        return Err(OrchestratorError::Passthrough("empty command".to_string()));
    };

    let config = &startup.config;
    let status = Command::new(program)
        .args(args)
        .current_dir(&config.paths.base)
        .env("OMNIBOOT_PORT", config.server.port.to_string())
        .env("OMNIBOOT_INFERENCE_URL", &config.inference.base_url)
        .env("OMNIBOOT_MODEL", &config.inference.model)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| OrchestratorError::Passthrough(format!("{}: {}", program, e)))?;

    Ok(exit_code_of(status))
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
