//! End-to-end tests of the startup pipeline
//!
//! Each test runs against a scratch project root with an empty tool search
//! path, so capability detection sees a bare host. Services are replaced
//! with scripted ones; nothing is actually launched.

use async_trait::async_trait;
use omniboot::capability::{Presence, ProbeSettings};
use omniboot::config::{Defaults, Overrides};
use omniboot::dispatch::{handoff, DispatchState, Handoff, Invocation, RunMode};
use omniboot::healing::DependencyResolver;
use omniboot::sequencer::{
    HealthProbe, ProbeResult, RecordingClock, RetryPolicy, ServiceSpec, StartProcedure,
};
use omniboot::{Orchestrator, OrchestratorError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Every module is already importable
struct InstalledResolver;

#[async_trait]
impl DependencyResolver for InstalledResolver {
    async fn is_importable(&self, _module: &str) -> Presence {
        Presence::present()
    }

    async fn install(&self, package: &str) -> Result<()> {
        panic!("unexpected install of {}", package);
    }
}

struct Scripted {
    healthy: bool,
}

#[async_trait]
impl HealthProbe for Scripted {
    async fn check(&self) -> ProbeResult {
        if self.healthy {
            Ok(())
        } else {
            Err("connection refused".to_string())
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Health check that never answers
struct Unresponsive;

#[async_trait]
impl HealthProbe for Unresponsive {
    async fn check(&self) -> ProbeResult {
        std::future::pending::<()>().await;
        Ok(())
    }

    fn describe(&self) -> String {
        "unresponsive".to_string()
    }
}

#[derive(Default)]
struct CountingStart {
    calls: AtomicU32,
}

#[async_trait]
impl StartProcedure for CountingStart {
    async fn start(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "counting".to_string()
    }
}

fn service(name: &str, start: Arc<CountingStart>, healthy: bool) -> ServiceSpec {
    ServiceSpec::new(
        name,
        start,
        Arc::new(Scripted { healthy }),
        RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)),
    )
}

fn orchestrator(root: &Path, empty_path: &Path) -> Orchestrator {
    let settings = ProbeSettings::for_root(root)
        .with_search_path(empty_path.as_os_str())
        .with_inference_url("http://127.0.0.1:9");

    Orchestrator::new(root, Defaults::default(), Overrides::default())
        .with_probe_settings(settings)
        .with_resolver(Arc::new(InstalledResolver))
        .with_clock(Arc::new(RecordingClock::new()))
}

fn scratch() -> (TempDir, TempDir) {
    (TempDir::new().unwrap(), TempDir::new().unwrap())
}

/// Minimal app server answering every request with 200
async fn serve_health() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            });
        }
    });
    port
}

#[tokio::test]
async fn test_heal_mode_skips_services() {
    let (root, bin) = scratch();
    let start = Arc::new(CountingStart::default());
    let orch = orchestrator(root.path(), bin.path())
        .with_services(vec![service("app-server", start.clone(), true)]);

    let startup = orch
        .start(Some(Invocation::Mode(RunMode::HealOnly)))
        .await
        .unwrap();

    assert_eq!(
        startup.state,
        DispatchState::HandedOff(Invocation::Mode(RunMode::HealOnly))
    );
    assert!(startup.readiness.is_none());
    assert_eq!(start.calls.load(Ordering::SeqCst), 0);

    // Layout was repaired and the audit trail persisted
    assert!(root.path().join("data/raw/data.csv").is_file());
    assert!(root.path().join("models").is_dir());
    assert!(startup.config.paths.healing_report().is_file());
    assert!(startup.healing.failed().next().is_none());
}

#[tokio::test]
async fn test_second_run_heals_nothing() {
    let (root, bin) = scratch();
    let orch = orchestrator(root.path(), bin.path()).without_healing_report();

    let first = orch
        .start(Some(Invocation::Mode(RunMode::HealOnly)))
        .await
        .unwrap();
    assert!(!first.healing.actions.is_empty());

    let second = orch
        .start(Some(Invocation::Mode(RunMode::HealOnly)))
        .await
        .unwrap();
    assert!(second.healing.actions.is_empty());
}

#[tokio::test]
async fn test_serve_without_inference_daemon() {
    let (root, bin) = scratch();
    let start = Arc::new(CountingStart::default());
    let orch = orchestrator(root.path(), bin.path())
        .without_healing_report()
        .with_services(vec![service("app-server", start.clone(), true)]);

    let startup = orch.start(None).await.unwrap();

    assert_eq!(
        startup.state,
        DispatchState::HandedOff(Invocation::Mode(RunMode::Serve))
    );
    assert!(!startup.config.inference.enabled);
    assert!(startup.config.inference.notice.is_some());
    assert!(startup.readiness.unwrap().is_ready("app-server"));
    // Already healthy, so never started
    assert_eq!(start.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_required_service_failure_aborts_startup() {
    let (root, bin) = scratch();
    let orch = orchestrator(root.path(), bin.path())
        .without_healing_report()
        .with_services(vec![service(
            "app-server",
            Arc::new(CountingStart::default()),
            false,
        )]);

    let result = orch.start(Some(Invocation::Mode(RunMode::Serve))).await;

    match result {
        Err(OrchestratorError::ServiceFailed { service, attempts }) => {
            assert_eq!(service, "app-server");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected ServiceFailed, got {:?}", other.map(|s| s.state)),
    }
}

#[tokio::test]
async fn test_marker_file_selects_mode() {
    let (root, bin) = scratch();
    std::fs::write(root.path().join(".omniboot-mode"), "heal\n").unwrap();
    let orch = orchestrator(root.path(), bin.path()).without_healing_report();

    let startup = orch.start(None).await.unwrap();

    assert_eq!(
        startup.state,
        DispatchState::HandedOff(Invocation::Mode(RunMode::HealOnly))
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_passthrough_exit_code_propagates() {
    let (root, bin) = scratch();
    let orch = orchestrator(root.path(), bin.path())
        .without_healing_report()
        .with_services(vec![service(
            "app-server",
            Arc::new(CountingStart::default()),
            true,
        )]);

    let command = ["/bin/sh", "-c", "exit 3"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let startup = orch
        .start(Some(Invocation::Passthrough(command)))
        .await
        .unwrap();
    let outcome = handoff::hand_off(&orch, startup).await.unwrap();

    assert!(matches!(outcome, Handoff::Passthrough { exit_code: 3 }));
    assert_eq!(outcome.exit_code(), 3);
}

#[tokio::test]
async fn test_agent_status_task() {
    let (root, bin) = scratch();
    let orch = orchestrator(root.path(), bin.path())
        .without_healing_report()
        .with_services(vec![service(
            "app-server",
            Arc::new(CountingStart::default()),
            true,
        )]);

    let startup = orch
        .start(Some(Invocation::Mode(RunMode::AgentTask(
            "status".to_string(),
        ))))
        .await
        .unwrap();
    let port = startup.config.server.port;

    match handoff::hand_off(&orch, startup).await.unwrap() {
        Handoff::AgentTask(output) => {
            assert!(output.success);
            assert_eq!(output.task, "status");
            let result = output.result.unwrap();
            assert_eq!(result["server"]["port"], port);
            assert_eq!(result["inference"]["enabled"], false);
        }
        other => panic!("expected agent task output, got {:?}", other),
    }
}

#[tokio::test]
async fn test_running_app_server_keeps_its_port() {
    let (root, bin) = scratch();
    let port = serve_health().await;

    let mut settings = ProbeSettings::for_root(root.path())
        .with_search_path(bin.path().as_os_str())
        .with_inference_url("http://127.0.0.1:9");
    settings.port_scan_start = port;
    settings.port_scan_count = 1;

    // Standard catalog: the real app server start would fail in a scratch root
    let orch = Orchestrator::new(root.path(), Defaults::default(), Overrides::default())
        .with_probe_settings(settings)
        .with_resolver(Arc::new(InstalledResolver))
        .with_clock(Arc::new(RecordingClock::new()))
        .without_healing_report();

    let startup = orch
        .start(Some(Invocation::Mode(RunMode::Serve)))
        .await
        .unwrap();

    assert_eq!(startup.capabilities.facts().running_app_port, Some(port));
    assert_eq!(startup.config.server.port, port);
    assert!(startup.readiness.unwrap().is_ready("app-server"));
    assert_eq!(orch.events().stats().starts_invoked, 0);
}

#[tokio::test]
async fn test_startup_timeout_cancels_with_exit_code_130() {
    let (root, bin) = scratch();
    let orch = orchestrator(root.path(), bin.path())
        .without_healing_report()
        .with_startup_timeout(Duration::from_millis(200))
        .with_services(vec![ServiceSpec::new(
            "app-server",
            Arc::new(CountingStart::default()),
            Arc::new(Unresponsive),
            RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(3600)),
        )]);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        orch.start(Some(Invocation::Mode(RunMode::Serve))),
    )
    .await
    .expect("startup timeout must end the run");

    match result {
        Err(e @ OrchestratorError::Cancelled { .. }) => {
            assert!(e.to_string().contains("app-server"));
            assert_eq!(e.exit_code(), 130);
        }
        other => panic!("expected Cancelled, got {:?}", other.map(|s| s.state)),
    }
    // The outer token stays usable for serving
    assert!(!orch.cancellation().is_cancelled());
}
