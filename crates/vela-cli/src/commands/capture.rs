//! Capture command - stream a file or stdin to object storage.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use vela_core::location::GCS_SCHEME;
use vela_core::{ByteReader, ObjectLocation, join_object_path};
use vela_launch::capture::{PROFILE_WRITER_HOOK, register_profile_writer};
use vela_launch::hooks::HookRegistry;

use crate::OutputFormat;
use crate::backends;

/// Arguments for the capture command.
#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// `gs://bucket/prefix` destination.
    #[arg(long, env = "VELA_CPU_PROFILING")]
    pub destination: String,

    /// Object name under the destination prefix.
    #[arg(long)]
    pub spec: String,

    /// File to upload (default: stdin).
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Abort if the upload takes longer than this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// URI the capture named `spec` lands at under `destination`.
fn capture_target(destination: &str, spec: &str) -> Result<String> {
    let location = ObjectLocation::parse(destination)?;
    Ok(format!(
        "{GCS_SCHEME}{}/{}",
        location.bucket(),
        join_object_path(location.object(), spec)
    ))
}

/// Execute the capture command.
///
/// # Errors
///
/// Returns an error if the destination is invalid, the input cannot be
/// opened, or the upload fails.
pub async fn execute(args: CaptureArgs, format: OutputFormat) -> Result<()> {
    let clients = backends::storage_clients()?;
    let hooks = HookRegistry::new();
    register_profile_writer(&hooks, clients)?;
    hooks.enable(PROFILE_WRITER_HOOK, vec![args.destination.clone()])?;

    let target = capture_target(&args.destination, &args.spec)?;

    let reader: ByteReader = match &args.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let ctx = backends::run_context(args.timeout_secs.map(Duration::from_secs));
    hooks
        .capture(&ctx, PROFILE_WRITER_HOOK, &args.spec, reader)
        .await
        .with_context(|| format!("Failed to write {target}"))?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "written": target }))
                    .context("Failed to serialize response")?
            );
        }
        OutputFormat::Text => println!("Wrote {target}"),
    }
    Ok(())
}
