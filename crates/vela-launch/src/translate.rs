//! Job translation.
//!
//! A [`JobTranslator`] turns a compiled model, a launch configuration and a
//! staging plan into the job description the remote service accepts. In
//! dry-run mode the description is printed instead of submitted.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::BoxError;
use crate::model::{PipelineOptions, PortableModel};
use crate::naming::StagingPlan;
use crate::options::LaunchConfiguration;

/// Name of the worker payload package inside the worker pool.
pub const WORKER_PACKAGE_NAME: &str = "worker";

/// Produces a job description without contacting the remote service.
#[async_trait]
pub trait JobTranslator: Send + Sync {
    /// Translates `model` under `config`, referencing the staged artifacts in `plan`.
    async fn translate(
        &self,
        ctx: &RunContext,
        model: &PortableModel,
        config: &LaunchConfiguration,
        plan: &StagingPlan,
    ) -> std::result::Result<JobDescription, BoxError>;
}

/// Batch or streaming execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    /// Bounded input, job ends when input is consumed.
    #[serde(rename = "JOB_TYPE_BATCH")]
    Batch,
    /// Unbounded input, job runs until cancelled or drained.
    #[serde(rename = "JOB_TYPE_STREAMING")]
    Streaming,
}

/// Job resource in the shape the Dataflow `v1b3` API accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    /// Job name.
    pub name: String,
    /// Project the job runs in.
    pub project_id: String,
    /// Regional endpoint.
    pub location: String,
    /// Batch or streaming.
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Execution environment.
    pub environment: JobEnvironment,
    /// User labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Environment section of a [`JobDescription`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvironment {
    /// Prefix for temporary files.
    pub temp_storage_prefix: String,
    /// Experiment flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experiments: Vec<String>,
    /// Options visible to the SDK harness on the workers.
    pub sdk_pipeline_options: SdkPipelineOptions,
    /// Worker pools; the launcher always produces exactly one.
    pub worker_pools: Vec<WorkerPool>,
    /// Identifies the submitting client.
    pub user_agent: UserAgent,
}

/// Pipeline options section of a [`JobEnvironment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkPipelineOptions {
    /// Runner-level options.
    pub options: RunnerOptions,
    /// Generic options exported by the launcher, passed through unchanged.
    #[serde(default, skip_serializing_if = "PipelineOptions::is_empty")]
    pub pipeline_options: PipelineOptions,
}

/// Runner-level pipeline options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerOptions {
    /// Job name.
    pub job_name: String,
    /// Project.
    pub project: String,
    /// Region.
    pub region: String,
    /// Temp location.
    pub temp_location: String,
    /// Staged model the workers load.
    pub pipeline_url: String,
    /// Experiment flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experiments: Vec<String>,
}

/// A pool of workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPool {
    /// Pool kind.
    pub kind: String,
    /// Packages staged onto each worker.
    pub packages: Vec<Package>,
    /// Container image the workers boot from.
    pub worker_harness_container_image: String,
    /// Initial worker count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<u32>,
    /// Machine type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    /// Zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// VPC network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Teardown policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_policy: Option<String>,
}

/// A staged package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package name.
    pub name: String,
    /// Where it was staged.
    pub location: String,
}

/// Client identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgent {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            name: "vela".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A dry-run result: the model's text form and the translated job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPreview {
    /// Text form of the compiled model.
    pub model_text: String,
    /// The job that would have been submitted.
    pub job: JobDescription,
}

impl fmt::Display for JobPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let job = serde_json::to_string_pretty(&self.job).map_err(|_| fmt::Error)?;
        writeln!(f, "Model:")?;
        writeln!(f, "{}", self.model_text)?;
        writeln!(f, "Job:")?;
        write!(f, "{job}")
    }
}

/// Translates launches into Dataflow job descriptions.
#[derive(Debug, Clone, Default)]
pub struct DataflowTranslator {
    user_agent: UserAgent,
}

impl DataflowTranslator {
    /// Creates a translator identifying as vela.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the job description. Synchronous core of [`JobTranslator::translate`].
    ///
    /// # Errors
    ///
    /// Fails if the job name is not a legal Dataflow name, the model has no
    /// container image, or the temp location is not a `gs://` URI.
    pub fn describe(
        &self,
        model: &PortableModel,
        config: &LaunchConfiguration,
        plan: &StagingPlan,
    ) -> std::result::Result<JobDescription, BoxError> {
        if !is_valid_job_name(config.job_name()) {
            return Err(format!(
                "job name '{}' must match [a-z]([-a-z0-9]*[a-z0-9])?",
                config.job_name()
            )
            .into());
        }
        if model.environment.container_image.is_empty() {
            return Err("model has no worker container image".into());
        }
        if !config.temp_location().starts_with(vela_core::location::GCS_SCHEME) {
            return Err(format!(
                "temp location '{}' is not a gs:// location",
                config.temp_location()
            )
            .into());
        }

        let streaming = config
            .pipeline_options()
            .get("streaming")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let mut packages = Vec::new();
        if config.worker_binary().is_some() {
            packages.push(Package {
                name: WORKER_PACKAGE_NAME.to_string(),
                location: plan.worker_location.clone(),
            });
        }

        Ok(JobDescription {
            name: config.job_name().to_string(),
            project_id: config.project().to_string(),
            location: config.region().to_string(),
            job_type: if streaming {
                JobType::Streaming
            } else {
                JobType::Batch
            },
            environment: JobEnvironment {
                temp_storage_prefix: config.temp_location().to_string(),
                experiments: config.experiments().to_vec(),
                sdk_pipeline_options: SdkPipelineOptions {
                    options: RunnerOptions {
                        job_name: config.job_name().to_string(),
                        project: config.project().to_string(),
                        region: config.region().to_string(),
                        temp_location: config.temp_location().to_string(),
                        pipeline_url: plan.model_location.clone(),
                        experiments: config.experiments().to_vec(),
                    },
                    pipeline_options: config.pipeline_options().clone(),
                },
                worker_pools: vec![WorkerPool {
                    kind: "harness".to_string(),
                    packages,
                    worker_harness_container_image: model.environment.container_image.clone(),
                    num_workers: config.num_workers(),
                    machine_type: config.machine_type().map(str::to_string),
                    zone: config.zone().map(str::to_string),
                    network: config.network().map(str::to_string),
                    teardown_policy: config.teardown_policy().map(str::to_string),
                }],
                user_agent: self.user_agent.clone(),
            },
            labels: config.labels().clone(),
        })
    }
}

#[async_trait]
impl JobTranslator for DataflowTranslator {
    async fn translate(
        &self,
        _ctx: &RunContext,
        model: &PortableModel,
        config: &LaunchConfiguration,
        plan: &StagingPlan,
    ) -> std::result::Result<JobDescription, BoxError> {
        self.describe(model, config, plan)
    }
}

/// Dataflow job names: lowercase letter first, then lowercase letters,
/// digits and dashes, not ending in a dash.
fn is_valid_job_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    first.is_ascii_lowercase()
        && *last != b'-'
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ArtifactNamer;
    use crate::options::{FixedImageResolver, RawOptions, resolve};
    use serde_json::json;

    async fn config(raw: RawOptions) -> LaunchConfiguration {
        resolve(&RunContext::new(), &raw, &FixedImageResolver::new("img:1"))
            .await
            .unwrap()
    }

    fn raw() -> RawOptions {
        RawOptions {
            project: "acme".into(),
            staging_location: "gs://acme-staging/jobs".into(),
            job_name: "nightly-rollup".into(),
            labels: Some(r#"{"team":"data"}"#.into()),
            num_workers: Some(4),
            machine_type: Some("n2-standard-4".into()),
            min_cpu_platform: Some("v2".into()),
            ..RawOptions::default()
        }
    }

    #[tokio::test]
    async fn describes_job_from_launch() {
        let config = config(raw()).await;
        let model = PortableModel::new(json!({"transforms": {"a": {}}}), "img:1");
        let plan = ArtifactNamer::new().next_staging_plan(config.staging_location());

        let job = DataflowTranslator::new()
            .translate(&RunContext::new(), &model, &config, &plan)
            .await
            .unwrap();

        assert_eq!(job.name, "nightly-rollup");
        assert_eq!(job.project_id, "acme");
        assert_eq!(job.location, "us-central1");
        assert_eq!(job.job_type, JobType::Batch);
        assert_eq!(job.labels.get("team").map(String::as_str), Some("data"));
        assert_eq!(job.environment.temp_storage_prefix, "gs://acme-staging/jobs/tmp");
        assert_eq!(job.environment.experiments, ["min_cpu_platform=v2"]);
        assert_eq!(
            job.environment.sdk_pipeline_options.options.pipeline_url,
            plan.model_location
        );

        let pool = &job.environment.worker_pools[0];
        assert_eq!(pool.worker_harness_container_image, "img:1");
        assert_eq!(pool.num_workers, Some(4));
        assert!(pool.packages.is_empty());
    }

    #[tokio::test]
    async fn worker_binary_becomes_package() {
        let config = config(RawOptions {
            worker_binary: Some("/tmp/worker".into()),
            ..raw()
        })
        .await;
        let model = PortableModel::new(json!({}), "img:1");
        let plan = ArtifactNamer::new().next_staging_plan(config.staging_location());

        let job = DataflowTranslator::new().describe(&model, &config, &plan).unwrap();
        let packages = &job.environment.worker_pools[0].packages;
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].location, plan.worker_location);
    }

    #[tokio::test]
    async fn streaming_option_selects_job_type() {
        let mut raw = raw();
        raw.pipeline_options.insert("streaming", json!(true));
        let config = config(raw).await;
        let plan = ArtifactNamer::new().next_staging_plan(config.staging_location());

        let job = DataflowTranslator::new()
            .describe(&PortableModel::new(json!({}), "img:1"), &config, &plan)
            .unwrap();
        assert_eq!(job.job_type, JobType::Streaming);
        assert_eq!(
            serde_json::to_value(&job).unwrap()["type"],
            json!("JOB_TYPE_STREAMING")
        );
    }

    #[tokio::test]
    async fn rejects_illegal_job_name() {
        let config = config(RawOptions {
            job_name: "Nightly_Rollup".into(),
            ..raw()
        })
        .await;
        let plan = ArtifactNamer::new().next_staging_plan(config.staging_location());
        let err = DataflowTranslator::new()
            .describe(&PortableModel::new(json!({}), "img:1"), &config, &plan)
            .unwrap_err();
        assert!(err.to_string().contains("Nightly_Rollup"));
    }

    #[tokio::test]
    async fn rejects_non_gcs_temp_location() {
        let config = config(RawOptions {
            temp_location: Some("/tmp/local".into()),
            ..raw()
        })
        .await;
        let plan = ArtifactNamer::new().next_staging_plan(config.staging_location());
        assert!(
            DataflowTranslator::new()
                .describe(&PortableModel::new(json!({}), "img:1"), &config, &plan)
                .is_err()
        );
    }

    #[test]
    fn job_name_rules() {
        assert!(is_valid_job_name("a"));
        assert!(is_valid_job_name("wordcount-2024"));
        assert!(!is_valid_job_name(""));
        assert!(!is_valid_job_name("1job"));
        assert!(!is_valid_job_name("job-"));
        assert!(!is_valid_job_name("job_name"));
    }
}
