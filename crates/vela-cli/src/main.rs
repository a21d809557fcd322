//! Vela CLI - Command-line interface for launching pipelines.
//!
//! The main entry point for the `vela` binary.

use anyhow::Result;
use clap::Parser;

use vela_cli::{Cli, Commands};
use vela_core::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Submit(args) => vela_cli::commands::submit::execute(*args, cli.format).await,
            Commands::Capture(args) => {
                vela_cli::commands::capture::execute(args, cli.format).await
            }
        }
    })
}
