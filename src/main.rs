//! omniboot - main CLI entry point

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use omniboot::{
    cli::Args,
    config::{Defaults, Overrides},
    dispatch::handoff,
    telemetry::{self, EventRecorder},
    Orchestrator, OrchestratorError, Startup,
};
use std::io::IsTerminal;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let verbosity = args.verbosity();
    let progress =
        (verbosity.show_progress() && std::io::stderr().is_terminal()).then(spinner);
    telemetry::init_logging(verbosity, progress.clone());

    let result = run(&args, progress.clone()).await;
    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            e.downcast_ref::<OrchestratorError>()
                .map(OrchestratorError::exit_code)
                .unwrap_or(1)
        }
    };

    std::process::exit(code);
}

async fn run(args: &Args, progress: Option<ProgressBar>) -> Result<i32> {
    let verbosity = args.verbosity();
    let invocation = args.invocation()?;
    let defaults = Defaults::load(args.config.clone())?;
    let overrides = Overrides::from_env();

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut events = EventRecorder::new();
    if let Some(bar) = progress {
        events = events.with_progress(bar);
    }

    let mut orchestrator = Orchestrator::new(args.project_root(), defaults, overrides)
        .with_events(events.clone())
        .with_cancellation(cancel);
    if let Some(timeout) = args.startup_timeout() {
        orchestrator = orchestrator.with_startup_timeout(timeout);
    }

    let started = orchestrator.start(invocation).await;
    events.finish();
    let startup = started?;

    if args.report || verbosity.show_details() {
        print_reports(&startup);
    }
    if verbosity.show_details() {
        eprint!("{}", events.render_summary());
    }

    let outcome = handoff::hand_off(&orchestrator, startup).await?;
    Ok(outcome.exit_code())
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            token.cancel();
        }
    });
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message("Starting up...");
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_reports(startup: &Startup) {
    println!("\n{}", "Capabilities".bold());
    print!("{}", startup.capabilities.render());

    println!("\n{}", "Healing".bold());
    print!("{}", startup.healing.render());

    if let Some(readiness) = &startup.readiness {
        println!("\n{}", "Services".bold());
        print!("{}", readiness.render());
    }

    if !startup.config.ignored_overrides.is_empty() {
        println!(
            "\n{} {}",
            "Ignored overrides:".yellow(),
            startup.config.ignored_overrides.join(", ")
        );
    }
    println!();
}
