//! One-shot agent tasks

use crate::errors::{OrchestratorError, Result};
use crate::healing::ExpectedLayout;
use crate::orchestrator::{Orchestrator, Startup};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentTask {
    /// Full healing pass
    Heal,
    /// Fresh capability probe
    Detect,
    /// Re-probe and re-synthesize the configuration
    Adapt,
    /// Install missing runtime dependencies only
    InstallDeps,
    /// Readiness table plus selection and healing summary
    Status,
}

const ALL: [AgentTask; 5] = [
    AgentTask::Heal,
    AgentTask::Detect,
    AgentTask::Adapt,
    AgentTask::InstallDeps,
    AgentTask::Status,
];

impl AgentTask {
    pub fn from_name(name: &str) -> Result<Self> {
        ALL.iter()
            .copied()
            .find(|task| task.name() == name)
            .ok_or_else(|| OrchestratorError::UnknownTask(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentTask::Heal => "heal",
            AgentTask::Detect => "detect",
            AgentTask::Adapt => "adapt",
            AgentTask::InstallDeps => "install_deps",
            AgentTask::Status => "status",
        }
    }

    pub fn names() -> Vec<&'static str> {
        ALL.iter().map(AgentTask::name).collect()
    }

    pub async fn execute(&self, orchestrator: &Orchestrator, startup: &Startup) -> Result<Value> {
        let config = &startup.config;
        match self {
            AgentTask::Heal => {
                let report = orchestrator
                    .heal(config, &ExpectedLayout::standard(config))
                    .await;
                Ok(serde_json::to_value(report)?)
            }
            AgentTask::Detect => Ok(serde_json::to_value(orchestrator.detect().await)?),
            AgentTask::Adapt => {
                let capabilities = orchestrator.detect().await;
                Ok(serde_json::to_value(orchestrator.synthesize(&capabilities))?)
            }
            AgentTask::InstallDeps => {
                let layout = ExpectedLayout::standard(config).dependencies_only();
                let report = orchestrator.heal(config, &layout).await;
                Ok(serde_json::to_value(report.actions)?)
            }
            AgentTask::Status => Ok(json!({
                "selection": startup.selection,
                "readiness": startup.readiness,
                "healing": {
                    "run_id": startup.healing.run_id,
                    "actions": startup.healing.actions.len(),
                    "failed": startup.healing.failed().count(),
                },
                "server": {
                    "port": config.server.port,
                    "health_url": config.server.health_url(),
                },
                "inference": {
                    "enabled": config.inference.enabled,
                    "model": config.inference.model,
                },
            })),
        }
    }
}

impl fmt::Display for AgentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON envelope printed for every task run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutput {
    pub task: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutput {
    pub fn from_result(task: AgentTask, result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self {
                task: task.name().to_string(),
                success: true,
                result: Some(value),
                error: None,
            },
            Err(e) => Self {
                task: task.name().to_string(),
                success: false,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}
