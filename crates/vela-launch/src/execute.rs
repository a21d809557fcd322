//! Job execution contract.
//!
//! A [`JobExecutor`] stages a launch's artifacts, submits the job and,
//! unless detached, waits for it to finish. Its errors are opaque to the
//! orchestrator and reach the caller unchanged.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::BoxError;
use crate::model::PortableModel;
use crate::naming::StagingPlan;
use crate::options::LaunchConfiguration;

/// Everything an executor needs for one submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitJob<'a> {
    /// Compiled model to stage.
    pub model: &'a PortableModel,
    /// Resolved launch configuration, hooks already exported.
    pub config: &'a LaunchConfiguration,
    /// Where to stage the model and worker payload.
    pub plan: &'a StagingPlan,
    /// Override for the service endpoint.
    pub endpoint: Option<&'a str>,
    /// Return once the job is accepted instead of waiting for it to finish.
    pub detached: bool,
}

/// Submits jobs to a remote execution service.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Stages artifacts and submits the job described by `job`.
    async fn submit(
        &self,
        ctx: &RunContext,
        job: SubmitJob<'_>,
    ) -> std::result::Result<JobHandle, BoxError>;
}

/// Lifecycle state of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Accepted, not yet started.
    #[serde(rename = "JOB_STATE_PENDING")]
    Pending,
    /// Waiting for resources.
    #[serde(rename = "JOB_STATE_QUEUED")]
    Queued,
    /// Running.
    #[serde(rename = "JOB_STATE_RUNNING")]
    Running,
    /// Finished successfully.
    #[serde(rename = "JOB_STATE_DONE")]
    Done,
    /// Failed.
    #[serde(rename = "JOB_STATE_FAILED")]
    Failed,
    /// Cancellation requested.
    #[serde(rename = "JOB_STATE_CANCELLING")]
    Cancelling,
    /// Cancelled.
    #[serde(rename = "JOB_STATE_CANCELLED")]
    Cancelled,
    /// Draining in-flight work.
    #[serde(rename = "JOB_STATE_DRAINING")]
    Draining,
    /// Drained.
    #[serde(rename = "JOB_STATE_DRAINED")]
    Drained,
    /// Replaced by an updated job.
    #[serde(rename = "JOB_STATE_UPDATED")]
    Updated,
    /// Paused.
    #[serde(rename = "JOB_STATE_STOPPED")]
    Stopped,
    /// Not yet known, or a state this client does not recognize.
    #[serde(rename = "JOB_STATE_UNKNOWN", other)]
    Unknown,
}

impl JobState {
    /// Returns true if the job will not change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Failed | Self::Cancelled | Self::Drained | Self::Updated
        )
    }

    /// Returns true for the one terminal state that counts as success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "JOB_STATE_UNKNOWN",
            Self::Pending => "JOB_STATE_PENDING",
            Self::Queued => "JOB_STATE_QUEUED",
            Self::Running => "JOB_STATE_RUNNING",
            Self::Done => "JOB_STATE_DONE",
            Self::Failed => "JOB_STATE_FAILED",
            Self::Cancelling => "JOB_STATE_CANCELLING",
            Self::Cancelled => "JOB_STATE_CANCELLED",
            Self::Draining => "JOB_STATE_DRAINING",
            Self::Drained => "JOB_STATE_DRAINED",
            Self::Updated => "JOB_STATE_UPDATED",
            Self::Stopped => "JOB_STATE_STOPPED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    /// Service-assigned job id.
    pub job_id: String,
    /// Job name.
    pub name: String,
    /// Project the job runs in.
    pub project: String,
    /// Region the job runs in.
    pub region: String,
    /// Last observed state.
    pub state: JobState,
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {} ({}) in {}/{}: {}",
            self.name, self.job_id, self.project, self.region, self.state
        )
    }
}
