//! omniboot - self-healing startup orchestrator
//!
//! Five stages run in order on every invocation:
//!
//! - **capability**: probe the host for tools, runtimes and free ports
//! - **config**: synthesize the effective configuration
//! - **healing**: repair the project layout and dependencies
//! - **sequencer**: bring dependent services up with bounded backoff
//! - **dispatch**: hand off to serve, interactive, agent, heal or a command

pub mod errors;

pub use errors::{OrchestratorError, Result};

pub mod capability;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod healing;
pub mod orchestrator;
pub mod sequencer;
pub mod telemetry;

pub use orchestrator::{Orchestrator, Startup};
