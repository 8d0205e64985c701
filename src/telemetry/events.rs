//! In-process record of startup events

use crate::sequencer::ReadinessState;
use colored::*;
use indicatif::ProgressBar;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Something observable that happened during startup
#[derive(Debug, Clone, PartialEq)]
pub enum StartupEvent {
    /// A pipeline stage finished
    StageCompleted {
        stage: String,
        elapsed: Duration,
    },
    StateChanged {
        service: String,
        from: ReadinessState,
        to: ReadinessState,
    },
    StartInvoked {
        service: String,
    },
    ProbeAttempt {
        service: String,
        attempt: u32,
        healthy: bool,
        detail: Option<String>,
    },
    BackoffWait {
        service: String,
        attempt: u32,
        delay: Duration,
    },
}

impl StartupEvent {
    /// One-line summary, used as the spinner message
    pub fn summary(&self) -> String {
        match self {
            StartupEvent::StageCompleted { stage, elapsed } => {
                format!("{} done in {}ms", stage, elapsed.as_millis())
            }
            StartupEvent::StateChanged { service, to, .. } => {
                format!("{}: {}", service, to.display_name())
            }
            StartupEvent::StartInvoked { service } => format!("{}: starting", service),
            StartupEvent::ProbeAttempt {
                service,
                attempt,
                healthy,
                ..
            } => {
                let verdict = if *healthy { "healthy" } else { "not ready" };
                format!("{}: probe #{} {}", service, attempt, verdict)
            }
            StartupEvent::BackoffWait {
                service, delay, ..
            } => format!("{}: waiting {}ms", service, delay.as_millis()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupStats {
    pub stages_completed: usize,
    pub starts_invoked: usize,
    pub probes: usize,
    pub probe_failures: usize,
    pub waits: usize,
    pub total_wait: Duration,
    pub services_ready: usize,
    pub services_failed: usize,
}

/// Shared, cloneable event sink
#[derive(Clone)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<StartupEvent>>>,
    stats: Arc<Mutex<StartupStats>>,
    progress: Option<ProgressBar>,
    start_time: Instant,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(StartupStats::default())),
            progress: None,
            start_time: Instant::now(),
        }
    }

    /// Mirror every recorded event onto a spinner
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn record(&self, event: StartupEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                StartupEvent::StageCompleted { .. } => stats.stages_completed += 1,
                StartupEvent::StartInvoked { .. } => stats.starts_invoked += 1,
                StartupEvent::ProbeAttempt { healthy, .. } => {
                    stats.probes += 1;
                    if !healthy {
                        stats.probe_failures += 1;
                    }
                }
                StartupEvent::BackoffWait { delay, .. } => {
                    stats.waits += 1;
                    stats.total_wait += *delay;
                }
                StartupEvent::StateChanged { to, .. } => match to {
                    ReadinessState::Ready => stats.services_ready += 1,
                    ReadinessState::Failed => stats.services_failed += 1,
                    _ => {}
                },
            }
        }

        if let Some(bar) = &self.progress {
            bar.set_message(event.summary());
        }

        lock(&self.events).push(event);
    }

    pub fn stats(&self) -> StartupStats {
        lock(&self.stats).clone()
    }

    pub fn events(&self) -> Vec<StartupEvent> {
        lock(&self.events).clone()
    }

    /// Events concerning one service, in order
    pub fn events_for(&self, service: &str) -> Vec<StartupEvent> {
        lock(&self.events)
            .iter()
            .filter(|event| match event {
                StartupEvent::StageCompleted { .. } => false,
                StartupEvent::StateChanged { service: s, .. }
                | StartupEvent::StartInvoked { service: s }
                | StartupEvent::ProbeAttempt { service: s, .. }
                | StartupEvent::BackoffWait { service: s, .. } => s == service,
            })
            .cloned()
            .collect()
    }

    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Stop the spinner, if any, leaving the last message visible
    pub fn finish(&self) {
        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
    }

    /// Verbose end-of-startup summary
    pub fn render_summary(&self) -> String {
        let stats = self.stats();
        let mut out = String::new();
        out.push_str(&format!("\n{}\n", "Startup summary".bold()));
        out.push_str("─────────────────────────────────────\n");
        out.push_str(&format!("Duration:          {:?}\n", self.elapsed()));
        out.push_str(&format!("Stages completed:  {}\n", stats.stages_completed));
        out.push_str(&format!("Services ready:    {}\n", stats.services_ready));
        out.push_str(&format!("Services failed:   {}\n", stats.services_failed));
        out.push_str(&format!(
            "Probes:            {} ({} not ready)\n",
            stats.probes, stats.probe_failures
        ));
        out.push_str(&format!(
            "Backoff waits:     {} ({}ms total)\n",
            stats.waits,
            stats.total_wait.as_millis()
        ));
        out
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

// A panicking recorder must not take the orchestrator down with it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_starts_empty() {
        let recorder = EventRecorder::new();
        assert_eq!(recorder.event_count(), 0);
        assert_eq!(recorder.stats(), StartupStats::default());
    }

    #[test]
    fn test_stats_follow_events() {
        let recorder = EventRecorder::new();
        recorder.record(StartupEvent::ProbeAttempt {
            service: "app-server".to_string(),
            attempt: 1,
            healthy: false,
            detail: Some("connection refused".to_string()),
        });
        recorder.record(StartupEvent::BackoffWait {
            service: "app-server".to_string(),
            attempt: 1,
            delay: Duration::from_millis(500),
        });
        recorder.record(StartupEvent::ProbeAttempt {
            service: "app-server".to_string(),
            attempt: 2,
            healthy: true,
            detail: None,
        });
        recorder.record(StartupEvent::StateChanged {
            service: "app-server".to_string(),
            from: ReadinessState::HealthCheckPending,
            to: ReadinessState::Ready,
        });

        let stats = recorder.stats();
        assert_eq!(stats.probes, 2);
        assert_eq!(stats.probe_failures, 1);
        assert_eq!(stats.waits, 1);
        assert_eq!(stats.total_wait, Duration::from_millis(500));
        assert_eq!(stats.services_ready, 1);
    }

    #[test]
    fn test_events_for_filters_by_service() {
        let recorder = EventRecorder::new();
        recorder.record(StartupEvent::StartInvoked {
            service: "inference-daemon".to_string(),
        });
        recorder.record(StartupEvent::StartInvoked {
            service: "app-server".to_string(),
        });
        recorder.record(StartupEvent::StageCompleted {
            stage: "probe".to_string(),
            elapsed: Duration::from_millis(3),
        });

        assert_eq!(recorder.events_for("app-server").len(), 1);
        assert_eq!(recorder.event_count(), 3);
    }

    #[test]
    fn test_clones_share_storage() {
        let recorder = EventRecorder::new();
        let clone = recorder.clone();
        clone.record(StartupEvent::StartInvoked {
            service: "overlay-network".to_string(),
        });
        assert_eq!(recorder.stats().starts_invoked, 1);
    }

    #[test]
    fn test_summary_mentions_counts() {
        colored::control::set_override(false);
        let recorder = EventRecorder::new();
        recorder.record(StartupEvent::StateChanged {
            service: "app-server".to_string(),
            from: ReadinessState::HealthCheckPending,
            to: ReadinessState::Failed,
        });
        let summary = recorder.render_summary();
        assert!(summary.contains("Services failed:   1"));
    }
}
