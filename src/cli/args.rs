//! Command-line argument parsing
//!
//! `omniboot [OPTIONS] [MODE [ARGS...]]`: anything after the options that
//! is not a mode keyword is run as a passthrough command.

use crate::dispatch::Invocation;
use crate::errors::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// omniboot - detect, configure, heal and start a project, then hand off
#[derive(Parser, Debug)]
#[command(name = "omniboot")]
#[command(version)]
#[command(about = "Self-healing startup orchestrator", long_about = None)]
pub struct Args {
    /// Project root (current directory by default)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Defaults file (~/.omniboot/config.toml by default)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Give up on service startup after this many seconds
    #[arg(long, value_name = "SECS")]
    pub startup_timeout: Option<u64>,

    /// Verbosity level: -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print capability, healing and readiness reports before handing off
    #[arg(long)]
    pub report: bool,

    /// serve | interactive | agent <task> | heal | <command...>
    #[arg(value_name = "MODE", trailing_var_arg = true, allow_hyphen_values = true)]
    pub mode: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Project root (current dir if not specified)
    pub fn project_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    /// Explicitly requested invocation, if any
    pub fn invocation(&self) -> Result<Option<Invocation>> {
        Invocation::parse(&self.mode)
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout.map(Duration::from_secs)
    }
}

impl Verbosity {
    /// Default `tracing` filter when `RUST_LOG` is unset
    pub fn log_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }

    pub fn show_progress(&self) -> bool {
        matches!(self, Verbosity::Normal)
    }

    /// Startup summary and non-fatal issues
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
