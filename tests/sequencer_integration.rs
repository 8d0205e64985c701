//! Integration tests for the service sequencer
//!
//! Scripted probes and start procedures stand in for real daemons; a
//! recording clock makes backoff waits instant and observable.

use async_trait::async_trait;
use omniboot::sequencer::{
    FailureCause, HealthProbe, NoopStart, ProbeResult, ReadinessState, RecordingClock,
    RetryPolicy, SequenceStatus, Sequencer, ServiceSpec, StartProcedure,
};
use omniboot::telemetry::{EventRecorder, StartupEvent};
use omniboot::{OrchestratorError, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Probe with a fixed answer that counts how often it was asked
struct FixedProbe {
    healthy: bool,
    calls: AtomicU32,
}

impl FixedProbe {
    fn healthy() -> Arc<Self> {
        Arc::new(Self {
            healthy: true,
            calls: AtomicU32::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            healthy: false,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for FixedProbe {
    async fn check(&self) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy {
            Ok(())
        } else {
            Err("connection refused".to_string())
        }
    }

    fn describe(&self) -> String {
        "fixed".to_string()
    }
}

/// Start procedure that only records that it was invoked
#[derive(Default)]
struct SpyStart {
    calls: AtomicU32,
}

impl SpyStart {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StartProcedure for SpyStart {
    async fn start(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "spy".to_string()
    }
}

/// Probe that never answers on its own
struct HangingProbe;

#[async_trait]
impl HealthProbe for HangingProbe {
    async fn check(&self) -> ProbeResult {
        std::future::pending::<()>().await;
        Ok(())
    }

    fn describe(&self) -> String {
        "hanging".to_string()
    }
}

const UNIT: Duration = Duration::from_secs(1);

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, UNIT, Duration::from_secs(5))
}

#[tokio::test]
async fn test_exhausted_service_waits_sum_of_first_delays() {
    let clock = Arc::new(RecordingClock::new());
    let overlay = ServiceSpec::new(
        "overlay-network",
        SpyStart::new(),
        FixedProbe::failing(),
        policy(3),
    );

    let report = Sequencer::new(vec![overlay])
        .with_clock(clock.clone())
        .run()
        .await
        .unwrap();

    let outcome = report.outcome("overlay-network").unwrap();
    assert_eq!(outcome.state, ReadinessState::Failed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.waited(), 3 * UNIT);
    assert_eq!(clock.waits(), vec![UNIT, 2 * UNIT]);
    assert_eq!(clock.total(), 3 * UNIT);
    assert!(matches!(
        outcome.cause,
        Some(FailureCause::AttemptsExhausted { last_error: Some(_) })
    ));

    match report.into_result() {
        Err(OrchestratorError::ServiceFailed { service, attempts }) => {
            assert_eq!(service, "overlay-network");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected ServiceFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_required_failure_never_starts_downstream() {
    let upstream_start = SpyStart::new();
    let downstream_start = SpyStart::new();
    let downstream_probe = FixedProbe::healthy();

    let inference = ServiceSpec::new(
        "inference-daemon",
        upstream_start.clone(),
        FixedProbe::failing(),
        policy(2),
    );
    let app = ServiceSpec::new(
        "app-server",
        downstream_start.clone(),
        downstream_probe.clone(),
        policy(2),
    )
    .after("inference-daemon");

    let report = Sequencer::new(vec![inference, app])
        .with_clock(Arc::new(RecordingClock::new()))
        .run()
        .await
        .unwrap();

    assert_eq!(upstream_start.calls(), 1);
    assert_eq!(downstream_start.calls(), 0);
    assert_eq!(downstream_probe.calls(), 0);
    assert_eq!(
        report.outcome("app-server").unwrap().state,
        ReadinessState::NotStarted
    );
    assert_eq!(
        report.status,
        SequenceStatus::Failed {
            service: "inference-daemon".to_string(),
            attempts: 2
        }
    );
}

#[tokio::test]
async fn test_already_healthy_service_is_not_started() {
    let start = SpyStart::new();
    let probe = FixedProbe::healthy();
    let clock = Arc::new(RecordingClock::new());

    let report = Sequencer::new(vec![ServiceSpec::new(
        "inference-daemon",
        start.clone(),
        probe.clone(),
        policy(5),
    )])
    .with_clock(clock.clone())
    .run()
    .await
    .unwrap();

    assert_eq!(start.calls(), 0);
    assert_eq!(probe.calls(), 1);
    assert!(clock.waits().is_empty());
    assert!(report.is_ready("inference-daemon"));
    assert_eq!(report.outcome("inference-daemon").unwrap().attempts, 0);
}

#[tokio::test]
async fn test_services_start_in_declaration_order() {
    let events = EventRecorder::new();
    let specs = vec![
        ServiceSpec::new("overlay-network", Arc::new(NoopStart), FixedProbe::failing(), policy(1))
            .optional(true),
        ServiceSpec::new("inference-daemon", SpyStart::new(), FixedProbe::failing(), policy(1))
            .optional(true),
        ServiceSpec::new("app-server", SpyStart::new(), FixedProbe::failing(), policy(1))
            .optional(true),
    ];

    let report = Sequencer::new(specs)
        .with_clock(Arc::new(RecordingClock::new()))
        .with_events(events.clone())
        .run()
        .await
        .unwrap();

    let started: Vec<String> = events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            StartupEvent::StartInvoked { service } => Some(service),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["overlay-network", "inference-daemon", "app-server"]);
    assert!(matches!(report.status, SequenceStatus::Degraded { ref failed } if failed.len() == 3));
}

#[tokio::test]
async fn test_cancellation_interrupts_hanging_probe() {
    let token = CancellationToken::new();
    let spec = ServiceSpec::new(
        "app-server",
        Arc::new(NoopStart),
        Arc::new(HangingProbe),
        RetryPolicy::new(3, UNIT, Duration::from_secs(3600)),
    );

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        Sequencer::new(vec![spec]).with_cancellation(token).run(),
    )
    .await
    .expect("cancellation must end the run")
    .unwrap();

    assert_eq!(
        report.status,
        SequenceStatus::Cancelled {
            service: "app-server".to_string()
        }
    );
    assert_eq!(
        report.outcome("app-server").unwrap().cause,
        Some(FailureCause::Cancelled)
    );
}

#[tokio::test]
async fn test_registered_service_runs_after_catalog() {
    let extra_start = SpyStart::new();
    let mut sequencer = Sequencer::new(vec![ServiceSpec::new(
        "app-server",
        Arc::new(NoopStart),
        FixedProbe::healthy(),
        policy(1),
    )]);
    sequencer.register(
        ServiceSpec::new("metrics-sidecar", extra_start.clone(), FixedProbe::failing(), policy(2))
            .after("app-server")
            .optional(true),
    );

    let report = sequencer
        .with_clock(Arc::new(RecordingClock::new()))
        .run()
        .await
        .unwrap();

    assert_eq!(extra_start.calls(), 1);
    assert_eq!(
        report.status,
        SequenceStatus::Degraded {
            failed: vec!["metrics-sidecar".to_string()]
        }
    );
}
