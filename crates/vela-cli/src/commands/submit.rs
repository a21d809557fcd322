//! Submit command - compile a pipeline document and launch it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Args;

use vela_launch::capture::register_profile_writer;
use vela_launch::compile::{DocumentCompiler, PipelineDocument};
use vela_launch::hooks::HookRegistry;
use vela_launch::model::PipelineOptions;
use vela_launch::options::{DEFAULT_REGION, FixedImageResolver, RawOptions};
use vela_launch::translate::DataflowTranslator;
use vela_launch::{Outcome, SubmissionOrchestrator};

use crate::OutputFormat;
use crate::backends;

/// Worker image used when `--worker-image` is not given.
pub const DEFAULT_WORKER_IMAGE: &str =
    concat!("ghcr.io/vela-dev/vela-worker:", env!("CARGO_PKG_VERSION"));

/// Arguments for the submit command.
#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Pipeline document (JSON) to compile.
    pub pipeline: PathBuf,

    /// Google Cloud project.
    #[arg(long, env = "VELA_PROJECT")]
    pub project: Option<String>,

    /// `gs://` location for staged artifacts.
    #[arg(long, env = "VELA_STAGING_LOCATION")]
    pub staging_location: Option<String>,

    /// Worker container image.
    #[arg(long, env = "VELA_WORKER_IMAGE")]
    pub worker_image: Option<String>,

    /// Job name (generated if unset).
    #[arg(long, env = "VELA_JOB_NAME")]
    pub job_name: Option<String>,

    /// Job labels as a JSON object of strings.
    #[arg(long, env = "VELA_LABELS")]
    pub labels: Option<String>,

    /// Number of workers.
    #[arg(long, env = "VELA_NUM_WORKERS")]
    pub num_workers: Option<u32>,

    /// Worker machine type.
    #[arg(long, env = "VELA_MACHINE_TYPE")]
    pub machine_type: Option<String>,

    /// Worker zone.
    #[arg(long, env = "VELA_ZONE")]
    pub zone: Option<String>,

    /// Dataflow region.
    #[arg(long, env = "VELA_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// VPC network.
    #[arg(long, env = "VELA_NETWORK")]
    pub network: Option<String>,

    /// `gs://` temp location (default: `<staging-location>/tmp`).
    #[arg(long, env = "VELA_TEMP_LOCATION")]
    pub temp_location: Option<String>,

    /// Minimum CPU platform for workers.
    #[arg(long, env = "VELA_MIN_CPU_PLATFORM")]
    pub min_cpu_platform: Option<String>,

    /// Worker teardown policy.
    #[arg(long, env = "VELA_TEARDOWN_POLICY")]
    pub teardown_policy: Option<String>,

    /// Experiments (comma-separated or repeated).
    #[arg(long = "experiment", env = "VELA_EXPERIMENTS", value_delimiter = ',')]
    pub experiments: Vec<String>,

    /// Local worker binary staged alongside the model.
    #[arg(long)]
    pub worker_binary: Option<PathBuf>,

    /// Pipeline option exported to workers, as `key=value` (repeatable).
    /// Values are parsed as JSON when possible and kept as strings otherwise.
    #[arg(long = "option", value_parser = parse_option)]
    pub options: Vec<(String, serde_json::Value)>,

    /// `gs://` destination for CPU profiles captured by workers.
    #[arg(long, env = "VELA_CPU_PROFILING")]
    pub cpu_profiling: Option<String>,

    /// Destination for session recordings (not supported on object storage).
    #[arg(long)]
    pub session_recording: Option<String>,

    /// Dataflow endpoint override.
    #[arg(long, env = "VELA_DATAFLOW_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Print the translated job instead of submitting it.
    #[arg(long)]
    pub dry_run: bool,

    /// Return once the job is accepted instead of waiting for it to finish.
    #[arg(long)]
    pub detached: bool,

    /// Abort if the launch takes longer than this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl SubmitArgs {
    /// Converts the flags into launch options.
    #[must_use]
    pub fn raw_options(&self) -> RawOptions {
        RawOptions {
            project: self.project.clone().unwrap_or_default(),
            staging_location: self.staging_location.clone().unwrap_or_default(),
            worker_image: self.worker_image.clone().unwrap_or_default(),
            job_name: self.job_name.clone().unwrap_or_default(),
            labels: self.labels.clone(),
            num_workers: self.num_workers,
            machine_type: self.machine_type.clone(),
            zone: self.zone.clone(),
            region: Some(self.region.clone()),
            network: self.network.clone(),
            temp_location: self.temp_location.clone(),
            min_cpu_platform: self.min_cpu_platform.clone(),
            teardown_policy: self.teardown_policy.clone(),
            experiments: self.experiments.clone(),
            worker_binary: self.worker_binary.clone(),
            pipeline_options: self.options.iter().cloned().collect::<PipelineOptions>(),
            dry_run: self.dry_run,
            detached: self.detached,
            cpu_profiling: self.cpu_profiling.clone(),
            session_recording: self.session_recording.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

fn parse_option(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty option key in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Compiles and launches the pipeline described by `args`.
///
/// # Errors
///
/// Returns an error if the pipeline document cannot be loaded or the
/// launch fails at any step.
pub async fn run(args: &SubmitArgs) -> Result<Outcome> {
    let document = PipelineDocument::from_path(&args.pipeline)
        .await
        .map_err(|e| anyhow!(e))
        .context("Failed to load pipeline document")?;

    let clients = backends::storage_clients()?;
    let hooks = Arc::new(HookRegistry::new());
    register_profile_writer(&hooks, Arc::clone(&clients))?;

    let orchestrator: SubmissionOrchestrator<PipelineDocument> = SubmissionOrchestrator::new(
        Arc::new(DocumentCompiler),
        Arc::new(DataflowTranslator::new()),
        backends::executor(clients)?,
        Arc::new(FixedImageResolver::new(DEFAULT_WORKER_IMAGE)),
        hooks,
    );

    let ctx = backends::run_context(args.timeout_secs.map(Duration::from_secs));
    let outcome = orchestrator
        .execute(&ctx, &document, &args.raw_options())
        .await?;
    Ok(outcome)
}

/// Execute the submit command.
///
/// # Errors
///
/// Returns an error if the launch fails or the result cannot be printed.
pub async fn execute(args: SubmitArgs, format: OutputFormat) -> Result<()> {
    let outcome = run(&args).await?;

    match (format, &outcome) {
        (OutputFormat::Json, Outcome::Previewed(preview)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(preview).context("Failed to serialize preview")?
            );
        }
        (OutputFormat::Json, Outcome::Submitted(handle)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(handle).context("Failed to serialize job handle")?
            );
        }
        (OutputFormat::Text, Outcome::Previewed(preview)) => {
            println!("{preview}");
        }
        (OutputFormat::Text, Outcome::Submitted(handle)) => {
            println!("Job submitted!");
            println!();
            println!("  Job ID:  {}", handle.job_id);
            println!("  Name:    {}", handle.name);
            println!("  Project: {}", handle.project);
            println!("  Region:  {}", handle.region);
            println!("  State:   {}", handle.state);
        }
    }

    Ok(())
}
