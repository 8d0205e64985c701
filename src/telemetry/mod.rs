//! Logging and startup telemetry
//!
//! `tracing` carries the human-facing log stream (stderr). The
//! [`EventRecorder`] keeps a structured copy of the sequencer's progress
//! for the verbose summary, the `status` agent task and tests.

pub mod events;

pub use events::{EventRecorder, StartupEvent, StartupStats};

use crate::cli::Verbosity;
use indicatif::ProgressBar;
use std::io::{self, IsTerminal, Write};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Stderr writer that hides the spinner while a log line is written
#[derive(Debug, Clone, Default)]
pub struct ProgressWriter {
    bar: Option<ProgressBar>,
}

impl ProgressWriter {
    pub fn new(bar: Option<ProgressBar>) -> Self {
        Self { bar }
    }

    fn emit<T>(&self, write: impl FnOnce(&mut io::Stderr) -> io::Result<T>) -> io::Result<T> {
        let mut stderr = io::stderr();
        match &self.bar {
            Some(bar) => bar.suspend(|| write(&mut stderr)),
            None => write(&mut stderr),
        }
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.emit(|stderr| stderr.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.emit(|stderr| stderr.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressWriter {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global stderr subscriber
///
/// `RUST_LOG` wins over the verbosity flags when set. Log lines pause
/// `progress` so the spinner never overwrites them. Calling this twice is
/// harmless; the second install is ignored.
pub fn init_logging(verbosity: Verbosity, progress: Option<ProgressBar>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(ProgressWriter::new(progress))
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}
