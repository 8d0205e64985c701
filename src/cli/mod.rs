//! Command-line interface for omniboot

pub mod args;

pub use args::{Args, Verbosity};
