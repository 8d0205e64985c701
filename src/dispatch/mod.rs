//! Mode dispatch
//!
//! Decides what the process turns into once startup is done, and tracks
//! the handoff with a small state machine (see [`DispatchState`]).

pub mod handoff;
pub mod interactive;
pub mod state;
pub mod tasks;

pub use handoff::Handoff;
pub use state::{DispatchEvent, DispatchState};
pub use tasks::AgentTask;

use crate::errors::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// File in the project root whose first line names the mode to run
pub const MODE_MARKER_FILE: &str = ".omniboot-mode";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "task", rename_all = "snake_case")]
pub enum RunMode {
    Serve,
    Interactive,
    AgentTask(String),
    HealOnly,
}

/// What to hand control to: a run mode or an arbitrary command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Invocation {
    Mode(RunMode),
    Passthrough(Vec<String>),
}

impl Invocation {
    /// Parse `MODE [ARGS...]`; `Ok(None)` for an empty word list
    ///
    /// Words that are not a mode keyword become a passthrough command.
    pub fn parse(words: &[String]) -> Result<Option<Self>> {
        let Some((keyword, rest)) = words.split_first() else {
            return Ok(None);
        };

        let invocation = match keyword.as_str() {
            "serve" => Invocation::Mode(RunMode::Serve),
            "interactive" => Invocation::Mode(RunMode::Interactive),
            "heal" => Invocation::Mode(RunMode::HealOnly),
            "agent" => {
                let task = rest.first().ok_or_else(|| {
                    OrchestratorError::ConfigError(format!(
                        "agent requires a task name ({})",
                        AgentTask::names().join(", ")
                    ))
                })?;
                AgentTask::from_name(task)?;
                Invocation::Mode(RunMode::AgentTask(task.clone()))
            }
            _ => Invocation::Passthrough(words.to_vec()),
        };

        let takes_args = matches!(
            invocation,
            Invocation::Passthrough(_) | Invocation::Mode(RunMode::AgentTask(_))
        );
        if !takes_args && !rest.is_empty() {
            return Err(OrchestratorError::ConfigError(format!(
                "mode '{}' takes no arguments",
                keyword
            )));
        }

        Ok(Some(invocation))
    }

    /// Healing-only runs skip service startup
    pub fn needs_services(&self) -> bool {
        !matches!(self, Invocation::Mode(RunMode::HealOnly))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Mode(RunMode::Serve) => f.write_str("serve"),
            Invocation::Mode(RunMode::Interactive) => f.write_str("interactive"),
            Invocation::Mode(RunMode::AgentTask(task)) => write!(f, "agent {}", task),
            Invocation::Mode(RunMode::HealOnly) => f.write_str("heal"),
            Invocation::Passthrough(argv) => write!(f, "exec {}", argv.join(" ")),
        }
    }
}

/// Where the selected invocation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    Explicit,
    Marker,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub invocation: Invocation,
    pub source: SelectionSource,
}

/// Explicit request > marker file > `serve`
pub fn select(explicit: Option<Invocation>, root: &Path) -> Result<Selection> {
    if let Some(invocation) = explicit {
        return Ok(Selection {
            invocation,
            source: SelectionSource::Explicit,
        });
    }

    let marker = root.join(MODE_MARKER_FILE);
    if marker.is_file() {
        let contents = std::fs::read_to_string(&marker)?;
        let first_line = contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("");
        let words: Vec<String> = first_line.split_whitespace().map(String::from).collect();

        match Invocation::parse(&words) {
            Ok(Some(invocation)) => {
                debug!("Mode '{}' selected by {}", invocation, marker.display());
                return Ok(Selection {
                    invocation,
                    source: SelectionSource::Marker,
                });
            }
            Ok(None) => debug!("{} is empty, using the default mode", marker.display()),
            Err(e) => {
                return Err(OrchestratorError::ConfigError(format!(
                    "{}: {}",
                    marker.display(),
                    e
                )))
            }
        }
    }

    Ok(Selection {
        invocation: Invocation::Mode(RunMode::Serve),
        source: SelectionSource::Default,
    })
}
