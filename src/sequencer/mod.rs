//! Service sequencing
//!
//! Brings dependent services up strictly in declaration order. Each
//! service is probed first (already healthy → Ready without starting),
//! otherwise started and polled under a bounded exponential backoff.
//! A required service that never becomes healthy aborts the sequence;
//! nothing after it is started.

pub mod backoff;
pub mod catalog;
pub mod clock;
pub mod engine;
pub mod probe;
pub mod start;
pub mod state;

pub use backoff::{Backoff, RetryPolicy};
pub use catalog::standard_services;
pub use clock::{Clock, RecordingClock, TokioClock};
pub use engine::{FailureCause, SequenceReport, SequenceStatus, Sequencer, ServiceOutcome};
pub use probe::{CommandProbe, HealthProbe, HttpProbe, ProbeResult, TcpProbe};
pub use start::{CommandStart, NoopStart, StartProcedure};
pub use state::{ReadinessEvent, ReadinessState};

use std::fmt;
use std::sync::Arc;

/// Names of the services in the standard catalog
pub mod services {
    pub const OVERLAY_NETWORK: &str = "overlay-network";
    pub const INFERENCE_DAEMON: &str = "inference-daemon";
    pub const APP_SERVER: &str = "app-server";
}

/// A service to bring up: how to start it, how to tell it is healthy
#[derive(Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub start: Arc<dyn StartProcedure>,
    pub probe: Arc<dyn HealthProbe>,
    pub policy: RetryPolicy,
    /// Services that must be Ready before this one starts
    pub depends_on: Vec<String>,
    /// A failure is logged and tolerated instead of aborting the sequence
    pub optional: bool,
}

impl ServiceSpec {
    pub fn new(
        name: impl Into<String>,
        start: Arc<dyn StartProcedure>,
        probe: Arc<dyn HealthProbe>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            probe,
            policy,
            depends_on: Vec::new(),
            optional: false,
        }
    }

    pub fn after(mut self, predecessor: impl Into<String>) -> Self {
        self.depends_on.push(predecessor.into());
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}

impl fmt::Debug for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSpec")
            .field("name", &self.name)
            .field("start", &self.start.describe())
            .field("probe", &self.probe.describe())
            .field("policy", &self.policy)
            .field("depends_on", &self.depends_on)
            .field("optional", &self.optional)
            .finish()
    }
}
