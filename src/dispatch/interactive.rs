//! Interactive menu
//!
//! Entries depend on the host: LLM, container and data-versioning items
//! only appear when the matching capability is present.

use crate::capability::{names, CapabilitySet};
use crate::healing::ExpectedLayout;
use crate::orchestrator::{Orchestrator, Startup};
use anyhow::Result;
use colored::*;
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io;
use sysinfo::System;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Heal,
    Detect,
    ShowConfig,
    ShowReadiness,
    SystemMonitor,
    Models,
    Containers,
    DataVersioning,
    Exit,
}

impl MenuItem {
    pub fn key(&self) -> &'static str {
        match self {
            MenuItem::Heal => "1",
            MenuItem::Detect => "2",
            MenuItem::ShowConfig => "3",
            MenuItem::ShowReadiness => "4",
            MenuItem::SystemMonitor => "5",
            MenuItem::Models => "7",
            MenuItem::Containers => "8",
            MenuItem::DataVersioning => "9",
            MenuItem::Exit => "0",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MenuItem::Heal => "Heal project",
            MenuItem::Detect => "Detect environment",
            MenuItem::ShowConfig => "Show configuration",
            MenuItem::ShowReadiness => "Show service readiness",
            MenuItem::SystemMonitor => "System monitor",
            MenuItem::Models => "Inference models",
            MenuItem::Containers => "Container status",
            MenuItem::DataVersioning => "Data versioning status",
            MenuItem::Exit => "Exit",
        }
    }
}

/// Entries offered on this host, in display order
pub fn menu_items(caps: &CapabilitySet) -> Vec<MenuItem> {
    let mut items = vec![
        MenuItem::Heal,
        MenuItem::Detect,
        MenuItem::ShowConfig,
        MenuItem::ShowReadiness,
        MenuItem::SystemMonitor,
    ];
    if caps.has(names::INFERENCE_DAEMON) {
        items.push(MenuItem::Models);
    }
    if caps.has(names::CONTAINER_RUNTIME) {
        items.push(MenuItem::Containers);
    }
    if caps.has(names::VERSIONED_DATA_STORE) {
        items.push(MenuItem::DataVersioning);
    }
    items.push(MenuItem::Exit);
    items
}

/// Match typed input against the offered entries only
pub fn parse_choice(input: &str, items: &[MenuItem]) -> Option<MenuItem> {
    let input = input.trim();
    items.iter().copied().find(|item| item.key() == input)
}

/// Run the menu until the user exits (0, Ctrl-D or Ctrl-C)
pub async fn run(orchestrator: &Orchestrator, startup: &Startup) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut caps = startup.capabilities.clone();

    loop {
        execute!(io::stdout(), Clear(ClearType::All), cursor::MoveTo(0, 0))?;
        println!("{}", "omniboot - interactive mode".bold().cyan());
        println!("{}\n", "=".repeat(40).cyan());

        let items = menu_items(&caps);
        for item in &items {
            println!("  {}. {}", item.key().green(), item.label());
        }

        let line = match editor.readline("\nSelect an option: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let Some(item) = parse_choice(&line, &items) else {
            println!("{}", "Invalid option".red());
            pause(&mut editor);
            continue;
        };
        let _ = editor.add_history_entry(line.trim());

        match item {
            MenuItem::Exit => break,
            MenuItem::Heal => {
                let layout = ExpectedLayout::standard(&startup.config);
                let report = orchestrator.heal(&startup.config, &layout).await;
                print!("{}", report.render());
            }
            MenuItem::Detect => {
                caps = orchestrator.detect().await;
                print!("{}", caps.render());
            }
            MenuItem::ShowConfig => println!("{}", startup.config.to_pretty_json()?),
            MenuItem::ShowReadiness => match &startup.readiness {
                Some(report) => print!("{}", report.render()),
                None => println!("Services were not started in this run"),
            },
            MenuItem::SystemMonitor => print!("{}", system_status()),
            MenuItem::Models => {
                let models = &caps.facts().installed_models;
                println!("Configured model: {}", startup.config.inference.model.bold());
                if models.is_empty() {
                    println!("No models reported by the inference daemon");
                }
                for model in models {
                    println!("  • {}", model);
                }
            }
            MenuItem::Containers => show_command("docker", &["ps"]).await,
            MenuItem::DataVersioning => show_command("dvc", &["status"]).await,
        }
        pause(&mut editor);
    }

    println!("{}", "Goodbye!".green());
    Ok(())
}

fn pause(editor: &mut DefaultEditor) {
    let _ = editor.readline("\nPress Enter to continue...");
}

fn system_status() -> String {
    let mut sys = System::new_all();
    sys.refresh_cpu();
    let used = sys.used_memory() as f64;
    let total = sys.total_memory().max(1) as f64;
    format!(
        "CPU:    {:.1}% across {} cores\nMemory: {:.1}% of {} MB\n",
        sys.global_cpu_info().cpu_usage(),
        sys.cpus().len(),
        used / total * 100.0,
        sys.total_memory() / (1024 * 1024)
    )
}

async fn show_command(program: &str, args: &[&str]) {
    match Command::new(program).args(args).status().await {
        Ok(status) if status.success() => {}
        Ok(status) => println!("{} exited with {}", program, status),
        Err(e) => println!("{} {}: {}", "Could not run".red(), program, e),
    }
}
