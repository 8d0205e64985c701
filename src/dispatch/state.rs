//! Dispatcher state machine
//!
//! Valid transitions:
//! 1. Selecting         → AwaitingReadiness(i) (on: Selected(i), i needs services)
//! 2. Selecting         → HandedOff(i)         (on: Selected(i), healing-only bypass)
//! 3. AwaitingReadiness → HandedOff(i)         (on: ServicesReady)
//! 4. AwaitingReadiness → Aborted              (on: ServicesFailed)
//! 5. HandedOff / Aborted are terminal

use super::Invocation;
use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchState {
    Selecting,
    AwaitingReadiness(Invocation),
    HandedOff(Invocation),
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Selected(Invocation),
    ServicesReady,
    ServicesFailed,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchState::HandedOff(_) | DispatchState::Aborted)
    }

    pub fn transition(&self, event: DispatchEvent) -> Result<DispatchState> {
        use DispatchEvent::*;
        use DispatchState::*;

        let next = match (self, event) {
            (HandedOff(invocation), _) => HandedOff(invocation.clone()),
            (Aborted, _) => Aborted,

            (Selecting, Selected(invocation)) if !invocation.needs_services() => {
                HandedOff(invocation)
            }
            (Selecting, Selected(invocation)) => AwaitingReadiness(invocation),

            (AwaitingReadiness(invocation), ServicesReady) => HandedOff(invocation.clone()),
            (AwaitingReadiness(_), ServicesFailed) => Aborted,

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
}
