//! Dataflow job executor.
//!
//! This module is only compiled when the `gcp` feature is enabled.
//!
//! Submission goes through the Dataflow `v1b3` REST API:
//! `POST {endpoint}/v1b3/projects/{project}/locations/{region}/jobs`.
//! Throttling and server errors are retried with a capped exponential
//! backoff; everything else fails the submission immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use vela_core::{StorageClientFactory, StorageScope};

use crate::context::RunContext;
use crate::error::{BoxError, Error};
use crate::execute::{JobExecutor, JobHandle, JobState, SubmitJob};
use crate::staging::stage_artifacts;
use crate::translate::{DataflowTranslator, JobDescription};

/// Public Dataflow endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://dataflow.googleapis.com";

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const MAX_ATTEMPTS: u32 = 4;
const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Errors raised by [`DataflowExecutor`].
///
/// They reach the caller through [`Error::Submission`] and can be recovered
/// with `downcast_ref::<DataflowError>()`.
#[derive(Debug, thiserror::Error)]
pub enum DataflowError {
    /// The endpoint override is not a usable base URL.
    #[error("invalid Dataflow endpoint {endpoint}: {message}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        endpoint: String,
        /// Why it was rejected.
        message: String,
    },

    /// Credentials could not be obtained.
    #[error("failed to authenticate with Google Cloud: {0}")]
    Auth(#[source] gcp_auth::Error),

    /// The HTTP request itself failed.
    #[error("Dataflow request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Dataflow API returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The job reached a terminal state other than done.
    #[error("job {job_id} finished in state {state}")]
    JobFailed {
        /// Service-assigned job id.
        job_id: String,
        /// Terminal state.
        state: JobState,
    },

    /// The launch could not be expressed as a Dataflow job.
    #[error("failed to translate job: {0}")]
    Translation(#[source] BoxError),

    /// Staging or a context interruption failed the launch.
    #[error(transparent)]
    Launch(#[from] Error),
}

/// Job resource fields read back from the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataflowJob {
    id: String,
    name: String,
    #[serde(default)]
    current_state: Option<JobState>,
}

impl DataflowJob {
    fn state(&self) -> JobState {
        self.current_state.unwrap_or(JobState::Unknown)
    }
}

/// Submits jobs to Dataflow and optionally waits for them to finish.
pub struct DataflowExecutor {
    clients: Arc<dyn StorageClientFactory>,
    translator: DataflowTranslator,
    http: reqwest::Client,
}

impl std::fmt::Debug for DataflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataflowExecutor").finish_non_exhaustive()
    }
}

impl DataflowExecutor {
    /// Creates an executor staging artifacts through `clients`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(clients: Arc<dyn StorageClientFactory>) -> Result<Self, DataflowError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(DataflowError::Request)?;
        Ok(Self {
            clients,
            translator: DataflowTranslator::new(),
            http,
        })
    }

    async fn submit_job(
        &self,
        ctx: &RunContext,
        job: SubmitJob<'_>,
    ) -> Result<JobHandle, DataflowError> {
        let description = self
            .translator
            .describe(job.model, job.config, job.plan)
            .map_err(DataflowError::Translation)?;
        let jobs = jobs_url(
            job.endpoint.unwrap_or(DEFAULT_ENDPOINT),
            job.config.project(),
            job.config.region(),
        )?;

        let storage = ctx
            .run("storage client", self.clients.connect(StorageScope::ReadWrite))
            .await?
            .map_err(Error::StorageClient)?;
        stage_artifacts(ctx, storage.as_ref(), job.model, job.config, job.plan).await?;

        let auth = credentials(ctx).await?;
        let created = ctx
            .run("job creation", self.create_job(auth.as_ref(), &jobs, &description))
            .await??;

        let mut handle = JobHandle {
            job_id: created.id.clone(),
            name: created.name.clone(),
            project: job.config.project().to_string(),
            region: job.config.region().to_string(),
            state: created.state(),
        };
        tracing::info!(
            job_id = %handle.job_id,
            console = %console_url(&handle),
            "submitted job"
        );

        if job.detached {
            return Ok(handle);
        }

        let url = job_url(&jobs, &handle.job_id)?;
        while !handle.state.is_terminal() {
            ctx.run("job polling", tokio::time::sleep(POLL_INTERVAL))
                .await?;
            let current = ctx
                .run("job polling", self.get_job(auth.as_ref(), &url))
                .await??;
            if current.state() != handle.state {
                tracing::info!(job_id = %handle.job_id, state = %current.state(), "job state changed");
            }
            handle.state = current.state();
        }

        if handle.state.is_success() {
            Ok(handle)
        } else {
            Err(DataflowError::JobFailed {
                job_id: handle.job_id,
                state: handle.state,
            })
        }
    }

    async fn create_job(
        &self,
        auth: &dyn TokenProvider,
        url: &Url,
        description: &JobDescription,
    ) -> Result<DataflowJob, DataflowError> {
        let token = access_token(auth).await?;
        let response = self
            .send_with_retry(|| {
                self.http
                    .post(url.clone())
                    .bearer_auth(&token)
                    .json(description)
            })
            .await?;
        response.json().await.map_err(DataflowError::Request)
    }

    async fn get_job(&self, auth: &dyn TokenProvider, url: &Url) -> Result<DataflowJob, DataflowError> {
        let token = access_token(auth).await?;
        let response = self
            .send_with_retry(|| self.http.get(url.clone()).bearer_auth(&token))
            .await?;
        response.json().await.map_err(DataflowError::Request)
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, DataflowError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if is_retryable(status) && attempt < MAX_ATTEMPTS {
                        tracing::debug!(%status, attempt, "retrying Dataflow request");
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return Err(DataflowError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                // Timeouts are not retried: the request may have been applied.
                Err(err) if !err.is_timeout() && attempt < MAX_ATTEMPTS => {
                    tracing::debug!(error = %err, attempt, "retrying Dataflow request");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(err) => return Err(DataflowError::Request(err)),
            }
        }
    }
}

#[async_trait]
impl JobExecutor for DataflowExecutor {
    async fn submit(
        &self,
        ctx: &RunContext,
        job: SubmitJob<'_>,
    ) -> std::result::Result<JobHandle, BoxError> {
        Ok(self.submit_job(ctx, job).await?)
    }
}

async fn access_token(auth: &dyn TokenProvider) -> Result<String, DataflowError> {
    let token = auth
        .token(&[CLOUD_PLATFORM_SCOPE])
        .await
        .map_err(DataflowError::Auth)?;
    Ok(token.as_str().to_string())
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let millis = 250_u64
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(4_000);
    Duration::from_millis(millis)
}

fn jobs_url(endpoint: &str, project: &str, region: &str) -> Result<Url, DataflowError> {
    let invalid = |message: String| DataflowError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message,
    };
    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("endpoint cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(["v1b3", "projects", project, "locations", region, "jobs"]);
    Ok(url)
}

fn job_url(jobs: &Url, job_id: &str) -> Result<Url, DataflowError> {
    let mut url = jobs.clone();
    url.path_segments_mut()
        .map_err(|()| DataflowError::InvalidEndpoint {
            endpoint: jobs.to_string(),
            message: "endpoint cannot be a base".to_string(),
        })?
        .push(job_id);
    Ok(url)
}

fn console_url(handle: &JobHandle) -> String {
    format!(
        "https://console.cloud.google.com/dataflow/jobs/{}/{}?project={}",
        handle.region, handle.job_id, handle.project
    )
}

/// Discovers ambient credentials, interruptible through `ctx`.
async fn credentials(ctx: &RunContext) -> Result<Arc<dyn TokenProvider>, DataflowError> {
    ctx.run("credential discovery", gcp_auth::provider())
        .await?
        .map_err(DataflowError::Auth)
}
