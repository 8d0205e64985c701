//! Sequencer run loop and its report

use super::probe::{check_within, ProbeResult};
use super::{Clock, ReadinessEvent, ReadinessState, ServiceSpec, TokioClock};
use crate::errors::{OrchestratorError, Result};
use crate::telemetry::{EventRecorder, StartupEvent};
use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a service ended up Failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    StartFailed { reason: String },
    AttemptsExhausted { last_error: Option<String> },
    DependencyNotReady { dependency: String },
    Cancelled,
}

/// Final readiness of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOutcome {
    pub name: String,
    pub state: ReadinessState,
    /// Health-check attempts after the start procedure ran
    pub attempts: u32,
    pub waited_ms: u64,
    pub optional: bool,
    pub cause: Option<FailureCause>,
}

impl ServiceOutcome {
    fn not_started(spec: &ServiceSpec) -> Self {
        Self {
            name: spec.name.clone(),
            state: ReadinessState::NotStarted,
            attempts: 0,
            waited_ms: 0,
            optional: spec.optional,
            cause: None,
        }
    }

    pub fn waited(&self) -> Duration {
        Duration::from_millis(self.waited_ms)
    }

    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SequenceStatus {
    /// Every service is Ready
    Ready,
    /// Only optional services failed
    Degraded { failed: Vec<String> },
    /// A required service failed; later services were not started
    Failed { service: String, attempts: u32 },
    Cancelled { service: String },
}

/// Readiness table handed off at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceReport {
    pub outcomes: Vec<ServiceOutcome>,
    pub status: SequenceStatus,
}

impl SequenceReport {
    pub fn outcome(&self, name: &str) -> Option<&ServiceOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.outcome(name).map(ServiceOutcome::is_ready).unwrap_or(false)
    }

    /// Ready and Degraded are usable; Failed and Cancelled become errors
    pub fn into_result(self) -> Result<Self> {
        match &self.status {
            SequenceStatus::Ready | SequenceStatus::Degraded { .. } => Ok(self),
            SequenceStatus::Failed { service, attempts } => Err(OrchestratorError::ServiceFailed {
                service: service.clone(),
                attempts: *attempts,
            }),
            SequenceStatus::Cancelled { service } => Err(OrchestratorError::Cancelled {
                service: service.clone(),
            }),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            let marker = match outcome.state {
                ReadinessState::Ready => "✓".green(),
                ReadinessState::Failed if outcome.optional => "!".yellow(),
                ReadinessState::Failed => "✗".red(),
                _ => "-".dimmed(),
            };
            let mut line = format!(
                "  {} {:<18} {}",
                marker,
                outcome.name,
                outcome.state.display_name()
            );
            if outcome.attempts > 0 {
                line.push_str(&format!(
                    " ({} attempt(s), waited {}ms)",
                    outcome.attempts, outcome.waited_ms
                ));
            }
            if let Some(cause) = &outcome.cause {
                let text = match cause {
                    FailureCause::StartFailed { reason } => format!("start failed: {}", reason),
                    FailureCause::AttemptsExhausted { last_error } => format!(
                        "never became healthy{}",
                        last_error
                            .as_ref()
                            .map(|e| format!(": {}", e))
                            .unwrap_or_default()
                    ),
                    FailureCause::DependencyNotReady { dependency } => {
                        format!("{} is not ready", dependency)
                    }
                    FailureCause::Cancelled => "cancelled".to_string(),
                };
                line.push_str(&format!(" {}", text.dimmed()));
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

/// Mutable bookkeeping for one service during a run
struct Progress {
    state: ReadinessState,
    attempts: u32,
    waited: Duration,
}

/// Brings services up in declaration order
pub struct Sequencer {
    specs: Vec<ServiceSpec>,
    clock: Arc<dyn Clock>,
    events: EventRecorder,
    cancel: CancellationToken,
}

impl Sequencer {
    pub fn new(specs: Vec<ServiceSpec>) -> Self {
        Self {
            specs,
            clock: Arc::new(TokioClock),
            events: EventRecorder::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventRecorder) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Append a service after the ones already registered
    pub fn register(&mut self, spec: ServiceSpec) {
        self.specs.push(spec);
    }

    pub fn specs(&self) -> &[ServiceSpec] {
        &self.specs
    }

    /// Names are unique and every predecessor is declared earlier
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for spec in &self.specs {
            for dependency in &spec.depends_on {
                if !seen.contains(dependency.as_str()) {
                    return Err(OrchestratorError::InvalidServiceGraph(format!(
                        "{} depends on {}, which is not declared before it",
                        spec.name, dependency
                    )));
                }
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(OrchestratorError::InvalidServiceGraph(format!(
                    "service {} is declared twice",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    /// Run the whole sequence
    ///
    /// Only an invalid service graph is an `Err`; service failures and
    /// cancellation are reported through [`SequenceReport::status`].
    pub async fn run(&self) -> Result<SequenceReport> {
        self.validate()?;

        let mut outcomes: Vec<ServiceOutcome> = Vec::with_capacity(self.specs.len());
        let mut degraded = Vec::new();
        let mut status = None;

        for spec in &self.specs {
            let blocker = spec.depends_on.iter().find(|dependency| {
                !outcomes
                    .iter()
                    .any(|o| &o.name == *dependency && o.is_ready())
            });

            let outcome = match blocker {
                Some(dependency) => self.blocked(spec, dependency)?,
                None => self.bring_up(spec).await?,
            };

            if outcome.state == ReadinessState::Failed {
                if outcome.cause == Some(FailureCause::Cancelled) {
                    warn!("Startup cancelled while bringing up {}", spec.name);
                    status = Some(SequenceStatus::Cancelled {
                        service: spec.name.clone(),
                    });
                } else if spec.optional {
                    warn!("Optional service {} failed; continuing without it", spec.name);
                    degraded.push(spec.name.clone());
                } else {
                    debug!(
                        "Required service {} failed after {} attempt(s)",
                        spec.name, outcome.attempts
                    );
                    status = Some(SequenceStatus::Failed {
                        service: spec.name.clone(),
                        attempts: outcome.attempts,
                    });
                }
            }

            outcomes.push(outcome);
            if status.is_some() {
                break;
            }
        }

        // Everything after an abort stays NotStarted
        for spec in self.specs.iter().skip(outcomes.len()) {
            outcomes.push(ServiceOutcome::not_started(spec));
        }

        let status = status.unwrap_or(if degraded.is_empty() {
            SequenceStatus::Ready
        } else {
            SequenceStatus::Degraded { failed: degraded }
        });

        Ok(SequenceReport { outcomes, status })
    }

    fn blocked(&self, spec: &ServiceSpec, dependency: &str) -> Result<ServiceOutcome> {
        warn!("Not starting {}: {} is not ready", spec.name, dependency);
        let mut progress = Progress::new();
        self.advance(spec, &mut progress, ReadinessEvent::DependencyNotReady)?;
        Ok(progress.finish(
            spec,
            Some(FailureCause::DependencyNotReady {
                dependency: dependency.to_string(),
            }),
        ))
    }

    async fn bring_up(&self, spec: &ServiceSpec) -> Result<ServiceOutcome> {
        let mut progress = Progress::new();

        match self.probe(spec, 0).await {
            None => return self.cancelled(spec, progress),
            Some(Ok(())) => {
                info!("{} already healthy, not starting it", spec.name);
                self.advance(spec, &mut progress, ReadinessEvent::AlreadyHealthy)?;
                return Ok(progress.finish(spec, None));
            }
            Some(Err(reason)) => debug!("{} not healthy yet: {}", spec.name, reason),
        }

        self.advance(spec, &mut progress, ReadinessEvent::StartIssued)?;
        info!("Starting {}: {}", spec.name, spec.start.describe());
        self.events.record(StartupEvent::StartInvoked {
            service: spec.name.clone(),
        });

        let launched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.cancelled(spec, progress),
            launched = spec.start.start() => launched,
        };
        if let Err(e) = launched {
            warn!("Could not start {}: {}", spec.name, e);
            self.advance(spec, &mut progress, ReadinessEvent::StartFailed)?;
            return Ok(progress.finish(
                spec,
                Some(FailureCause::StartFailed {
                    reason: e.to_string(),
                }),
            ));
        }
        self.advance(spec, &mut progress, ReadinessEvent::StartLaunched)?;

        let backoff = spec.policy.backoff();
        let mut last_error = None;

        for attempt in 1..=backoff.max_attempts() {
            progress.attempts = attempt;

            match self.probe(spec, attempt).await {
                None => return self.cancelled(spec, progress),
                Some(Ok(())) => {
                    info!("{} ready after {} attempt(s)", spec.name, attempt);
                    self.advance(spec, &mut progress, ReadinessEvent::ProbeSucceeded)?;
                    return Ok(progress.finish(spec, None));
                }
                Some(Err(reason)) => {
                    debug!(
                        "{} attempt {}/{} not ready: {}",
                        spec.name,
                        attempt,
                        backoff.max_attempts(),
                        reason
                    );
                    last_error = Some(reason);
                }
            }

            if backoff.has_next(attempt) {
                let delay = backoff.delay(attempt);
                self.events.record(StartupEvent::BackoffWait {
                    service: spec.name.clone(),
                    attempt,
                    delay,
                });
                if !self.wait(delay).await {
                    return self.cancelled(spec, progress);
                }
                progress.waited += delay;
            }
        }

        self.advance(spec, &mut progress, ReadinessEvent::AttemptsExhausted)?;
        Ok(progress.finish(spec, Some(FailureCause::AttemptsExhausted { last_error })))
    }

    /// One bounded probe call; `None` when cancelled first
    async fn probe(&self, spec: &ServiceSpec, attempt: u32) -> Option<ProbeResult> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = check_within(spec.probe.as_ref(), spec.policy.probe_timeout) => result,
        };

        self.events.record(StartupEvent::ProbeAttempt {
            service: spec.name.clone(),
            attempt,
            healthy: result.is_ok(),
            detail: result.as_ref().err().cloned(),
        });
        Some(result)
    }

    /// Backoff wait; `false` when cancelled first
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.clock.sleep(delay) => true,
        }
    }

    fn cancelled(&self, spec: &ServiceSpec, mut progress: Progress) -> Result<ServiceOutcome> {
        self.advance(spec, &mut progress, ReadinessEvent::Cancelled)?;
        Ok(progress.finish(spec, Some(FailureCause::Cancelled)))
    }

    fn advance(
        &self,
        spec: &ServiceSpec,
        progress: &mut Progress,
        event: ReadinessEvent,
    ) -> Result<()> {
        let next = progress.state.transition(event)?;
        if next != progress.state {
            self.events.record(StartupEvent::StateChanged {
                service: spec.name.clone(),
                from: progress.state,
                to: next,
            });
            progress.state = next;
        }
        Ok(())
    }
}

impl Progress {
    fn new() -> Self {
        Self {
            state: ReadinessState::NotStarted,
            attempts: 0,
            waited: Duration::ZERO,
        }
    }

    fn finish(self, spec: &ServiceSpec, cause: Option<FailureCause>) -> ServiceOutcome {
        ServiceOutcome {
            name: spec.name.clone(),
            state: self.state,
            attempts: self.attempts,
            waited_ms: self.waited.as_millis() as u64,
            optional: spec.optional,
            cause,
        }
    }
}
