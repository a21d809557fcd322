//! Submission orchestration.
//!
//! [`SubmissionOrchestrator::execute`] runs one launch end to end:
//!
//! 1. resolve the launch configuration
//! 2. enable the profile writer if a profiling destination is set
//! 3. export enabled hooks into the pipeline options
//! 4. compile the pipeline into a portable model
//! 5. plan staging locations
//! 6. preview (dry run) or submit
//!
//! Every step either succeeds or aborts the launch. Nothing is retried here;
//! the executor owns retry policy for the remote service.

use std::sync::Arc;

use tracing::Instrument;

use vela_core::observability::submission_span;

use crate::capture::PROFILE_WRITER_HOOK;
use crate::compile::{CompileOptions, GraphCompiler};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::execute::{JobExecutor, JobHandle, SubmitJob};
use crate::hooks::HookRegistry;
use crate::naming::ArtifactNamer;
use crate::options::{ImageResolver, LaunchConfiguration, RawOptions, resolve};
use crate::translate::{JobPreview, JobTranslator};

/// Result of a successful launch.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The job was handed to the executor.
    Submitted(JobHandle),
    /// Dry run: the job was translated but never sent.
    Previewed(JobPreview),
}

impl Outcome {
    /// The executor's handle, if the job was submitted.
    #[must_use]
    pub const fn job_handle(&self) -> Option<&JobHandle> {
        match self {
            Self::Submitted(handle) => Some(handle),
            Self::Previewed(_) => None,
        }
    }

    /// The preview, if this was a dry run.
    #[must_use]
    pub const fn preview(&self) -> Option<&JobPreview> {
        match self {
            Self::Previewed(preview) => Some(preview),
            Self::Submitted(_) => None,
        }
    }
}

/// Drives pipelines of type `P` from raw options to a submitted or
/// previewed job.
pub struct SubmissionOrchestrator<P: ?Sized + Sync> {
    compiler: Arc<dyn GraphCompiler<P>>,
    translator: Arc<dyn JobTranslator>,
    executor: Arc<dyn JobExecutor>,
    images: Arc<dyn ImageResolver>,
    hooks: Arc<HookRegistry>,
    namer: Arc<ArtifactNamer>,
}

impl<P: ?Sized + Sync> std::fmt::Debug for SubmissionOrchestrator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionOrchestrator")
            .field("hooks", &self.hooks)
            .field("namer", &self.namer)
            .finish_non_exhaustive()
    }
}

impl<P: ?Sized + Sync> SubmissionOrchestrator<P> {
    /// Creates an orchestrator that names artifacts with the process-wide
    /// [`ArtifactNamer::shared`] namer.
    #[must_use]
    pub fn new(
        compiler: Arc<dyn GraphCompiler<P>>,
        translator: Arc<dyn JobTranslator>,
        executor: Arc<dyn JobExecutor>,
        images: Arc<dyn ImageResolver>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            compiler,
            translator,
            executor,
            images,
            hooks,
            namer: ArtifactNamer::shared(),
        }
    }

    /// Replaces the process-wide namer with `namer`.
    #[must_use]
    pub fn with_namer(mut self, namer: Arc<ArtifactNamer>) -> Self {
        self.namer = namer;
        self
    }

    /// The hook registry this orchestrator exports from.
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Launches `pipeline` under `raw`.
    ///
    /// Returns [`Outcome::Previewed`] when `raw.dry_run` is set, without
    /// contacting the executor; otherwise [`Outcome::Submitted`] carrying
    /// the executor's handle unchanged.
    ///
    /// # Errors
    ///
    /// - option validation errors from [`resolve`]
    /// - hook errors if the profiling destination is rejected
    /// - [`Error::ModelCompilation`] if the compiler fails
    /// - [`Error::Translation`] if a dry-run translation fails
    /// - [`Error::Submission`] carrying the executor's error verbatim
    /// - [`Error::Cancelled`] / [`Error::DeadlineExceeded`] if `ctx` interrupts a step
    pub async fn execute(
        &self,
        ctx: &RunContext,
        pipeline: &P,
        raw: &RawOptions,
    ) -> Result<Outcome> {
        let config = resolve(ctx, raw, self.images.as_ref()).await?;
        let op = if raw.dry_run { "preview" } else { "submit" };
        let span = submission_span(op, config.job_name(), config.project());
        self.launch(ctx, pipeline, raw, config).instrument(span).await
    }

    async fn launch(
        &self,
        ctx: &RunContext,
        pipeline: &P,
        raw: &RawOptions,
        config: LaunchConfiguration,
    ) -> Result<Outcome> {
        if let Some(destination) = non_empty(raw.cpu_profiling.as_deref()) {
            self.hooks
                .enable(PROFILE_WRITER_HOOK, vec![destination.to_string()])?;
        }
        if let Some(destination) = non_empty(raw.session_recording.as_deref()) {
            tracing::warn!(
                destination,
                "session recording needs appendable writes; object storage only supports whole-object writes, ignoring"
            );
        }

        let mut options = config.pipeline_options().clone();
        self.hooks.export_into(&mut options)?;
        let config = config.with_pipeline_options(options);

        let compile_options = CompileOptions {
            container_image: config.worker_image().to_string(),
        };
        let model = ctx
            .run(
                "graph compilation",
                self.compiler.compile(ctx, pipeline, &compile_options),
            )
            .await?
            .map_err(Error::ModelCompilation)?;
        tracing::debug!(requirements = model.requirements.len(), "compiled model");

        let plan = self.namer.next_staging_plan(config.staging_location());
        tracing::debug!(
            model = %plan.model_location,
            worker = %plan.worker_location,
            "planned staging locations"
        );

        if raw.dry_run {
            let job = ctx
                .run(
                    "job translation",
                    self.translator.translate(ctx, &model, &config, &plan),
                )
                .await?
                .map_err(Error::Translation)?;
            let preview = JobPreview {
                model_text: model.to_string(),
                job,
            };
            tracing::info!(model = %preview.model_text, "dry run: compiled model");
            tracing::info!(
                job = %serde_json::to_string_pretty(&preview.job).unwrap_or_default(),
                "dry run: translated job"
            );
            return Ok(Outcome::Previewed(preview));
        }

        let submit = SubmitJob {
            model: &model,
            config: &config,
            plan: &plan,
            endpoint: non_empty(raw.endpoint.as_deref()),
            detached: raw.detached,
        };
        let handle = ctx
            .run("job submission", self.executor.submit(ctx, submit))
            .await?
            .map_err(Error::Submission)?;
        tracing::info!(job_id = %handle.job_id, state = %handle.state, "job submitted");
        Ok(Outcome::Submitted(handle))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
