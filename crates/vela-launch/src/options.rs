//! Launch option resolution.
//!
//! [`RawOptions`] is what the caller collected from flags and environment;
//! [`resolve`] validates it and fills in defaults, producing an immutable
//! [`LaunchConfiguration`]. Validation never touches the network; the only
//! delegated lookup is worker image resolution, and only when no image was
//! given.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use vela_core::join_uri;

use crate::context::RunContext;
use crate::error::{BoxError, Error, Result};
use crate::model::PipelineOptions;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-central1";

/// Experiment key the minimum CPU platform is folded into.
pub const MIN_CPU_PLATFORM_EXPERIMENT: &str = "min_cpu_platform";

/// Unvalidated launch inputs, as collected from flags or environment.
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    /// Google Cloud project (required).
    pub project: String,
    /// `gs://` location for staged artifacts (required).
    pub staging_location: String,
    /// Worker container image; resolved through an [`ImageResolver`] if empty.
    pub worker_image: String,
    /// Job name; generated if empty.
    pub job_name: String,
    /// JSON object of string labels.
    pub labels: Option<String>,
    /// Number of workers.
    pub num_workers: Option<u32>,
    /// Worker machine type.
    pub machine_type: Option<String>,
    /// Worker zone.
    pub zone: Option<String>,
    /// Region; defaults to [`DEFAULT_REGION`].
    pub region: Option<String>,
    /// VPC network.
    pub network: Option<String>,
    /// `gs://` temp location; defaults to `<staging_location>/tmp`.
    pub temp_location: Option<String>,
    /// Minimum CPU platform, folded into the experiments.
    pub min_cpu_platform: Option<String>,
    /// Worker teardown policy.
    pub teardown_policy: Option<String>,
    /// Experiment flags.
    pub experiments: Vec<String>,
    /// Local worker payload staged alongside the model.
    pub worker_binary: Option<PathBuf>,
    /// Generic pipeline options exported to workers.
    pub pipeline_options: PipelineOptions,
    /// Translate and print the job instead of submitting it.
    pub dry_run: bool,
    /// Return as soon as the job is accepted instead of waiting for it.
    pub detached: bool,
    /// `gs://` destination for CPU profiles captured by workers.
    pub cpu_profiling: Option<String>,
    /// Destination for session transcripts.
    pub session_recording: Option<String>,
    /// Override for the remote service endpoint.
    pub endpoint: Option<String>,
}

/// Validated, resolved launch parameters.
///
/// Immutable once resolved: every required field is non-empty and every
/// default has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchConfiguration {
    project: String,
    staging_location: String,
    worker_image: String,
    job_name: String,
    num_workers: Option<u32>,
    machine_type: Option<String>,
    zone: Option<String>,
    region: String,
    network: Option<String>,
    temp_location: String,
    teardown_policy: Option<String>,
    experiments: Vec<String>,
    labels: BTreeMap<String, String>,
    worker_binary: Option<PathBuf>,
    pipeline_options: PipelineOptions,
}

impl LaunchConfiguration {
    /// Google Cloud project.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Staging location URI.
    #[must_use]
    pub fn staging_location(&self) -> &str {
        &self.staging_location
    }

    /// Worker container image.
    #[must_use]
    pub fn worker_image(&self) -> &str {
        &self.worker_image
    }

    /// Job name.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Number of workers, if set.
    #[must_use]
    pub const fn num_workers(&self) -> Option<u32> {
        self.num_workers
    }

    /// Worker machine type, if set.
    #[must_use]
    pub fn machine_type(&self) -> Option<&str> {
        self.machine_type.as_deref()
    }

    /// Worker zone, if set.
    #[must_use]
    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// Region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// VPC network, if set.
    #[must_use]
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    /// Temp location URI.
    #[must_use]
    pub fn temp_location(&self) -> &str {
        &self.temp_location
    }

    /// Teardown policy, if set.
    #[must_use]
    pub fn teardown_policy(&self) -> Option<&str> {
        self.teardown_policy.as_deref()
    }

    /// Experiment flags, in order.
    #[must_use]
    pub fn experiments(&self) -> &[String] {
        &self.experiments
    }

    /// Job labels.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Local worker payload, if any.
    #[must_use]
    pub fn worker_binary(&self) -> Option<&std::path::Path> {
        self.worker_binary.as_deref()
    }

    /// Exported pipeline options.
    #[must_use]
    pub const fn pipeline_options(&self) -> &PipelineOptions {
        &self.pipeline_options
    }

    /// Returns a copy of this configuration with `options` exported instead.
    #[must_use]
    pub fn with_pipeline_options(&self, options: PipelineOptions) -> Self {
        Self {
            pipeline_options: options,
            ..self.clone()
        }
    }
}

/// Looks up the worker image when none was configured.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Returns the image reference to boot workers from.
    async fn resolve_image(&self, ctx: &RunContext) -> std::result::Result<String, BoxError>;
}

/// Resolver that always answers with the same image.
#[derive(Debug, Clone)]
pub struct FixedImageResolver {
    image: String,
}

impl FixedImageResolver {
    /// Creates a resolver answering `image`.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

#[async_trait]
impl ImageResolver for FixedImageResolver {
    async fn resolve_image(&self, _ctx: &RunContext) -> std::result::Result<String, BoxError> {
        if self.image.is_empty() {
            return Err("no default worker image configured".into());
        }
        Ok(self.image.clone())
    }
}

/// Validates `raw` and applies defaults.
///
/// Required fields are checked before anything else, so a missing project or
/// staging location fails without consulting `images`.
///
/// # Errors
///
/// - [`Error::MissingRequiredField`] if the project or staging location is empty
/// - [`Error::InvalidLabelFormat`] if labels are not a JSON object of strings
/// - [`Error::ImageResolution`] if the image had to be looked up and the lookup failed
/// - [`Error::Cancelled`] / [`Error::DeadlineExceeded`] if `ctx` interrupts the lookup
pub async fn resolve(
    ctx: &RunContext,
    raw: &RawOptions,
    images: &dyn ImageResolver,
) -> Result<LaunchConfiguration> {
    let project = required(
        &raw.project,
        "Google Cloud project",
        "Use --project=<project>",
    )?;
    let staging_location = required(
        &raw.staging_location,
        "GCS staging location",
        "Use --staging-location=gs://<bucket>/<path>",
    )?;
    let labels = parse_labels(raw.labels.as_deref())?;

    let worker_image = match non_empty(Some(&raw.worker_image)) {
        Some(image) => image,
        None => {
            let image = ctx
                .run("worker image resolution", images.resolve_image(ctx))
                .await?
                .map_err(Error::ImageResolution)?;
            tracing::debug!(image = %image, "resolved default worker image");
            image
        }
    };

    let mut experiments = raw.experiments.clone();
    if let Some(platform) = non_empty(raw.min_cpu_platform.as_ref()) {
        experiments.push(format!("{MIN_CPU_PLATFORM_EXPERIMENT}={platform}"));
    }

    let temp_location = non_empty(raw.temp_location.as_ref())
        .unwrap_or_else(|| join_uri(&staging_location, "tmp"));

    Ok(LaunchConfiguration {
        project,
        worker_image,
        job_name: non_empty(Some(&raw.job_name)).unwrap_or_else(default_job_name),
        num_workers: raw.num_workers,
        machine_type: non_empty(raw.machine_type.as_ref()),
        zone: non_empty(raw.zone.as_ref()),
        region: non_empty(raw.region.as_ref()).unwrap_or_else(|| DEFAULT_REGION.to_string()),
        network: non_empty(raw.network.as_ref()),
        temp_location,
        staging_location,
        teardown_policy: non_empty(raw.teardown_policy.as_ref()),
        experiments,
        labels,
        worker_binary: raw.worker_binary.clone(),
        pipeline_options: raw.pipeline_options.clone(),
    })
}

/// Parses a JSON object of string labels. Absent or blank input yields no labels.
///
/// Non-string values are rejected rather than coerced.
///
/// # Errors
///
/// Returns [`Error::InvalidLabelFormat`] carrying the JSON parse error.
pub fn parse_labels(raw: Option<&str>) -> Result<BTreeMap<String, String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(BTreeMap::new()),
        Some(text) => {
            serde_json::from_str(text).map_err(|source| Error::InvalidLabelFormat { source })
        }
    }
}

fn required(value: &str, field: &'static str, hint: &'static str) -> Result<String> {
    non_empty(Some(value)).ok_or(Error::MissingRequiredField { field, hint })
}

fn non_empty<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    value
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Generates a lowercase job name that is legal on Dataflow.
fn default_job_name() -> String {
    let now = Utc::now();
    format!(
        "vela-{}-{:09}",
        now.format("%Y%m%d-%H%M%S"),
        now.timestamp_subsec_nanos()
    )
}
