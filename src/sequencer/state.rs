//! Per-service readiness state machine
//!
//! Readiness only moves forward within one run:
//! - NotStarted → Ready when the service is already healthy
//! - NotStarted → Starting → HealthCheckPending → Ready | Failed
//! - any non-terminal state → Failed on cancellation
//!
//! Ready and Failed are terminal and absorb further events.

use crate::errors::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    NotStarted,
    Starting,
    HealthCheckPending,
    Ready,
    Failed,
}

/// Events that move a service between readiness states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessEvent {
    /// Pre-start probe found the service already healthy
    AlreadyHealthy,
    /// A declared predecessor is not Ready
    DependencyNotReady,
    StartIssued,
    StartLaunched,
    StartFailed,
    ProbeSucceeded,
    AttemptsExhausted,
    Cancelled,
}

impl ReadinessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadinessState::Ready | ReadinessState::Failed)
    }

    /// T: S × Event → Result<S>
    ///
    /// 1.  NotStarted         → Ready              (AlreadyHealthy)
    /// 2.  NotStarted         → Starting           (StartIssued)
    /// 3.  NotStarted         → Failed             (DependencyNotReady)
    /// 4.  Starting           → HealthCheckPending (StartLaunched)
    /// 5.  Starting           → Failed             (StartFailed)
    /// 6.  HealthCheckPending → Ready              (ProbeSucceeded)
    /// 7.  HealthCheckPending → Failed             (AttemptsExhausted)
    /// 8.  non-terminal       → Failed             (Cancelled)
    /// 9.  Ready / Failed absorb every event
    pub fn transition(&self, event: ReadinessEvent) -> Result<ReadinessState> {
        use ReadinessEvent::*;
        use ReadinessState::*;

        let next = match (self, event) {
            (Ready, _) => Ready,
            (Failed, _) => Failed,

            (_, Cancelled) => Failed,

            (NotStarted, AlreadyHealthy) => Ready,
            (NotStarted, StartIssued) => Starting,
            (NotStarted, DependencyNotReady) => Failed,

            (Starting, StartLaunched) => HealthCheckPending,
            (Starting, StartFailed) => Failed,

            (HealthCheckPending, ProbeSucceeded) => Ready,
            (HealthCheckPending, AttemptsExhausted) => Failed,

            (from, event) => {
                return Err(OrchestratorError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ReadinessState::NotStarted => "not started",
            ReadinessState::Starting => "starting",
            ReadinessState::HealthCheckPending => "waiting for health",
            ReadinessState::Ready => "ready",
            ReadinessState::Failed => "failed",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
