//! # vela-cli
//!
//! Command-line interface for vela.
//!
//! ## Commands
//!
//! - `vela submit` - Compile a pipeline document and submit it (or preview it with `--dry-run`)
//! - `vela capture` - Stream a file or stdin to object storage through the profile writer hook
//!
//! ## Configuration
//!
//! Every launch flag can also be set through the environment:
//!
//! - `VELA_PROJECT` - Google Cloud project
//! - `VELA_STAGING_LOCATION` - `gs://` location for staged artifacts
//! - `VELA_REGION` - Dataflow region (default: `us-central1`)
//! - `VELA_LOG_FORMAT` - `pretty` or `json`
//!
//! See `vela submit --help` for the full list.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod backends;
pub mod commands;

use clap::{Parser, Subcommand};
use vela_core::LogFormat;

/// Vela CLI - launch pipelines on Dataflow.
#[derive(Debug, Parser)]
#[command(name = "vela")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log output format (pretty or json).
    #[arg(long, env = "VELA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile and submit a pipeline.
    Submit(Box<commands::submit::SubmitArgs>),
    /// Stream data to object storage through the profile writer.
    Capture(commands::capture::CaptureArgs),
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}
