//! Startup pipeline
//!
//! Prober → Synthesizer → Healing Engine → Sequencer → Dispatcher. Each
//! stage consumes the previous stage's output; [`Orchestrator::start`]
//! runs them in order and stops at the dispatcher's handoff point.

use crate::capability::{CapabilitySet, ProbeSettings, Prober};
use crate::config::overrides::ENV_PREFIX;
use crate::config::{self, Defaults, EffectiveConfig, Overrides, Synthesizer};
use crate::dispatch::{self, DispatchEvent, DispatchState, Invocation, Selection};
use crate::errors::Result;
use crate::healing::{
    DependencyResolver, ExpectedLayout, HealingEngine, HealingReport, RuntimeResolver,
};
use crate::sequencer::{
    standard_services, Clock, SequenceReport, Sequencer, ServiceSpec, TokioClock,
};
use crate::telemetry::{EventRecorder, StartupEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything produced on the way to the handoff
#[derive(Debug)]
pub struct Startup {
    pub selection: Selection,
    pub state: DispatchState,
    pub capabilities: CapabilitySet,
    pub config: EffectiveConfig,
    pub healing: HealingReport,
    /// `None` when service startup was bypassed
    pub readiness: Option<SequenceReport>,
    /// Services that were brought up, for re-probing while serving
    pub services: Vec<ServiceSpec>,
}

pub struct Orchestrator {
    root: PathBuf,
    defaults: Defaults,
    overrides: Overrides,
    probe_settings: ProbeSettings,
    resolver: Arc<dyn DependencyResolver>,
    catalog: Option<Vec<ServiceSpec>>,
    extra_services: Vec<ServiceSpec>,
    clock: Arc<dyn Clock>,
    events: EventRecorder,
    cancel: CancellationToken,
    startup_timeout: Option<Duration>,
    persist_healing: bool,
}

impl Orchestrator {
    pub fn new(root: impl Into<PathBuf>, defaults: Defaults, overrides: Overrides) -> Self {
        let root = root.into();
        let inference_url = overrides
            .text("inference_url")
            .unwrap_or_else(|| defaults.inference.base_url.clone());
        let api_prefix = overrides
            .text("api_prefix")
            .unwrap_or_else(|| defaults.server.api_prefix.clone());
        let probe_settings = ProbeSettings::for_root(&root)
            .with_inference_url(inference_url)
            .with_app_health_path(config::health_path(&api_prefix));
        let resolver = Arc::new(RuntimeResolver::new(probe_settings.runtime.clone()));

        Self {
            root,
            defaults,
            overrides,
            probe_settings,
            resolver,
            catalog: None,
            extra_services: Vec::new(),
            clock: Arc::new(TokioClock),
            events: EventRecorder::new(),
            cancel: CancellationToken::new(),
            startup_timeout: None,
            persist_healing: true,
        }
    }

    pub fn with_probe_settings(mut self, settings: ProbeSettings) -> Self {
        self.probe_settings = settings;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the standard service catalog
    pub fn with_services(mut self, services: Vec<ServiceSpec>) -> Self {
        self.catalog = Some(services);
        self
    }

    /// Append a service after the catalog
    pub fn register(mut self, spec: ServiceSpec) -> Self {
        self.extra_services.push(spec);
        self
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

    /// Overrides the configured `startup_timeout_secs`
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// Skip writing `last-healing.json`
    pub fn without_healing_report(mut self) -> Self {
        self.persist_healing = false;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events(&self) -> &EventRecorder {
        &self.events
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stage 1
    pub async fn detect(&self) -> CapabilitySet {
        Prober::new(self.probe_settings.clone()).probe().await
    }

    /// Stage 2
    pub fn synthesize(&self, capabilities: &CapabilitySet) -> EffectiveConfig {
        Synthesizer::new(self.root.clone(), self.defaults.clone())
            .synthesize(capabilities, &self.overrides)
    }

    /// Stage 3; the report is also written under the logs directory
    pub async fn heal(&self, config: &EffectiveConfig, layout: &ExpectedLayout) -> HealingReport {
        let engine = HealingEngine::new(self.resolver.clone());
        let report = HealingReport::new(engine.heal(layout).await);

        if self.persist_healing {
            let path = config.paths.healing_report();
            if let Err(e) = report.save(&path) {
                warn!("Could not write healing report to {}: {}", path.display(), e);
            }
        }
        report
    }

    /// Services to bring up for `config`, in order
    pub fn services_for(&self, config: &EffectiveConfig) -> Vec<ServiceSpec> {
        let mut services = match &self.catalog {
            Some(catalog) => catalog.clone(),
            None => standard_services(config, &self.probe_settings.runtime),
        };
        services.extend(self.extra_services.iter().cloned());
        services
    }

    /// Stage 4, bounded by the startup timeout
    pub async fn bring_up(
        &self,
        config: &EffectiveConfig,
        services: Vec<ServiceSpec>,
    ) -> Result<SequenceReport> {
        let limit = self
            .startup_timeout
            .unwrap_or_else(|| Duration::from_secs(config.startup_timeout_secs));

        // Child token: the timeout must not cancel serving afterwards
        let token = self.cancel.child_token();
        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!("Startup timeout of {:?} elapsed", limit);
                token.cancel();
            })
        };

        let result = Sequencer::new(services)
            .with_clock(self.clock.clone())
            .with_events(self.events.clone())
            .with_cancellation(token)
            .run()
            .await;

        timer.abort();
        result
    }

    /// Run every stage up to the dispatcher's handoff point
    pub async fn start(&self, requested: Option<Invocation>) -> Result<Startup> {
        let selection = dispatch::select(requested, &self.root)?;
        info!(
            "Mode '{}' ({:?} selection)",
            selection.invocation, selection.source
        );

        let capabilities = self.stage("probe", self.detect()).await;
        debug!("Detected {} capabilities", capabilities.len());

        let started = Instant::now();
        let config = self.synthesize(&capabilities);
        self.stage_done("synthesize", started);
        for key in &config.ignored_overrides {
            warn!(
                "Ignoring {}{}: value could not be parsed",
                ENV_PREFIX,
                key.to_uppercase()
            );
        }
        if let Some(notice) = &config.inference.notice {
            info!("{}", notice);
        }

        let layout = ExpectedLayout::standard(&config);
        let healing = self.stage("heal", self.heal(&config, &layout)).await;
        if !healing.is_clean() {
            info!(
                "Applied {} healing action(s), {} failed",
                healing.actions.len(),
                healing.failed().count()
            );
        }

        let state =
            DispatchState::Selecting.transition(DispatchEvent::Selected(selection.invocation.clone()))?;

        let (state, readiness, services) = match state {
            DispatchState::AwaitingReadiness(_) => {
                let services = self.services_for(&config);
                let report = self
                    .stage("sequence", self.bring_up(&config, services.clone()))
                    .await?;
                match report.clone().into_result() {
                    Ok(report) => (
                        state.transition(DispatchEvent::ServicesReady)?,
                        Some(report),
                        services,
                    ),
                    Err(e) => {
                        let aborted = state.transition(DispatchEvent::ServicesFailed)?;
                        debug!("Dispatcher {:?}:\n{}", aborted, report.render());
                        return Err(e);
                    }
                }
            }
            handed_off => {
                debug!("Service startup bypassed");
                (handed_off, None, Vec::new())
            }
        };

        Ok(Startup {
            selection,
            state,
            capabilities,
            config,
            healing,
            readiness,
            services,
        })
    }

    async fn stage<T>(&self, name: &str, work: impl std::future::Future<Output = T>) -> T {
        let started = Instant::now();
        let output = work.await;
        self.stage_done(name, started);
        output
    }

    fn stage_done(&self, name: &str, started: Instant) {
        self.events.record(StartupEvent::StageCompleted {
            stage: name.to_string(),
            elapsed: started.elapsed(),
        });
    }
}
