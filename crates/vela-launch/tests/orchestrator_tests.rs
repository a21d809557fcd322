//! End-to-end tests for the submission orchestrator with recording fakes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use vela_core::MemoryClientFactory;
use vela_launch::prelude::*;

/// Stand-in for a user pipeline.
struct Pipeline {
    transforms: usize,
}

#[derive(Default)]
struct CountingCompiler {
    calls: AtomicUsize,
    images: Mutex<Vec<String>>,
}

#[async_trait]
impl GraphCompiler<Pipeline> for CountingCompiler {
    async fn compile(
        &self,
        _ctx: &RunContext,
        pipeline: &Pipeline,
        options: &CompileOptions,
    ) -> std::result::Result<PortableModel, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().push(options.container_image.clone());
        if pipeline.transforms == 0 {
            return Err("empty pipeline".into());
        }
        Ok(PortableModel::new(
            json!({"transforms": {"count": pipeline.transforms}}),
            &options.container_image,
        ))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("quota exceeded for project {project}")]
struct QuotaError {
    project: String,
}

#[derive(Debug, Clone)]
struct Recorded {
    job_name: String,
    plan_id: u64,
    model_location: String,
    endpoint: Option<String>,
    detached: bool,
    hooks: Option<serde_json::Value>,
}

#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<Recorded>>,
    reject: bool,
    hang: bool,
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn submit(&self, _ctx: &RunContext, job: SubmitJob<'_>) -> std::result::Result<JobHandle, BoxError> {
        self.calls.lock().unwrap().push(Recorded {
            job_name: job.config.job_name().to_string(),
            plan_id: job.plan.id,
            model_location: job.plan.model_location.clone(),
            endpoint: job.endpoint.map(str::to_string),
            detached: job.detached,
            hooks: job.config.pipeline_options().get("hooks").cloned(),
        });
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.reject {
            return Err(Box::new(QuotaError {
                project: job.config.project().to_string(),
            }));
        }
        Ok(JobHandle {
            job_id: "2026-10-16_04_05_06-1234".into(),
            name: job.config.job_name().to_string(),
            project: job.config.project().to_string(),
            region: job.config.region().to_string(),
            state: JobState::Pending,
        })
    }
}

struct Harness {
    compiler: Arc<CountingCompiler>,
    executor: Arc<RecordingExecutor>,
    orchestrator: SubmissionOrchestrator<Pipeline>,
}

fn harness(executor: RecordingExecutor) -> Harness {
    let compiler = Arc::new(CountingCompiler::default());
    let executor = Arc::new(executor);
    let hooks = Arc::new(HookRegistry::new());
    register_profile_writer(&hooks, Arc::new(MemoryClientFactory::default())).unwrap();

    let orchestrator = SubmissionOrchestrator::new(
        compiler.clone(),
        Arc::new(DataflowTranslator::new()),
        executor.clone(),
        Arc::new(FixedImageResolver::new("registry.example/worker:default")),
        hooks,
    );
    Harness {
        compiler,
        executor,
        orchestrator,
    }
}

fn raw() -> RawOptions {
    RawOptions {
        project: "acme-analytics".into(),
        staging_location: "gs://acme-staging/jobs".into(),
        job_name: "nightly-rollup".into(),
        ..RawOptions::default()
    }
}

const PIPELINE: Pipeline = Pipeline { transforms: 3 };

#[tokio::test]
async fn dry_run_previews_without_executor() {
    let h = harness(RecordingExecutor::default());
    let raw = RawOptions {
        dry_run: true,
        ..raw()
    };

    let outcome = h
        .orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw)
        .await
        .unwrap();

    let preview = outcome.preview().expect("dry run should preview");
    assert!(outcome.job_handle().is_none());
    assert_eq!(preview.job.name, "nightly-rollup");
    assert_eq!(preview.job.project_id, "acme-analytics");
    assert!(preview.model_text.contains("registry.example/worker:default"));
    assert!(preview.to_string().contains("nightly-rollup"));
    assert!(h.executor.calls.lock().unwrap().is_empty());
    assert_eq!(h.compiler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn submission_returns_executor_handle_unchanged() {
    let h = harness(RecordingExecutor::default());

    let outcome = h
        .orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw())
        .await
        .unwrap();

    let expected = JobHandle {
        job_id: "2026-10-16_04_05_06-1234".into(),
        name: "nightly-rollup".into(),
        project: "acme-analytics".into(),
        region: "us-central1".into(),
        state: JobState::Pending,
    };
    assert_eq!(outcome, Outcome::Submitted(expected));

    let calls = h.executor.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].job_name, "nightly-rollup");
    assert!(calls[0].model_location.starts_with("gs://acme-staging/jobs/model-1-"));
    assert!(!calls[0].detached);
    assert!(calls[0].hooks.is_none());
}

#[tokio::test]
async fn endpoint_and_detached_reach_executor() {
    let h = harness(RecordingExecutor::default());
    let raw = RawOptions {
        endpoint: Some("http://127.0.0.1:9000".into()),
        detached: true,
        ..raw()
    };

    h.orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw)
        .await
        .unwrap();

    let calls = h.executor.calls.lock().unwrap();
    assert_eq!(calls[0].endpoint.as_deref(), Some("http://127.0.0.1:9000"));
    assert!(calls[0].detached);
}

#[tokio::test]
async fn missing_project_fails_before_compilation() {
    let h = harness(RecordingExecutor::default());
    let raw = RawOptions {
        project: String::new(),
        ..raw()
    };

    let err = h
        .orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingRequiredField { .. }));
    assert_eq!(
        err.to_string(),
        "no Google Cloud project specified. Use --project=<project>"
    );
    assert_eq!(h.compiler.calls.load(Ordering::SeqCst), 0);
    assert!(h.executor.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn compiler_receives_resolved_image_and_failure_is_wrapped() {
    let h = harness(RecordingExecutor::default());

    let err = h
        .orchestrator
        .execute(&RunContext::new(), &Pipeline { transforms: 0 }, &raw())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ModelCompilation(_)));
    assert_eq!(err.to_string(), "failed to generate model pipeline: empty pipeline");
    assert_eq!(
        h.compiler.images.lock().unwrap().as_slice(),
        ["registry.example/worker:default"]
    );
    assert!(h.executor.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn profiling_destination_is_exported_as_hook() {
    let h = harness(RecordingExecutor::default());
    let raw = RawOptions {
        cpu_profiling: Some("gs://diagnostics/profiles".into()),
        ..raw()
    };

    h.orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw)
        .await
        .unwrap();

    let calls = h.executor.calls.lock().unwrap();
    assert_eq!(
        calls[0].hooks,
        Some(json!({"gcs_profile_writer": ["gs://diagnostics/profiles"]}))
    );
    assert_eq!(
        h.orchestrator
            .hooks()
            .enabled()
            .unwrap()
            .get(PROFILE_WRITER_HOOK)
            .map(Vec::len),
        Some(1)
    );
}

#[tokio::test]
async fn unparseable_profiling_destination_aborts_before_remote_calls() {
    let h = harness(RecordingExecutor::default());
    let raw = RawOptions {
        cpu_profiling: Some("/var/profiles".into()),
        ..raw()
    };

    let err = h
        .orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HookConfiguration { .. }));
    assert_eq!(h.compiler.calls.load(Ordering::SeqCst), 0);
    assert!(h.executor.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn session_recording_never_fails_the_run() {
    let h = harness(RecordingExecutor::default());
    let raw = RawOptions {
        session_recording: Some("gs://diagnostics/sessions".into()),
        ..raw()
    };

    let outcome = h
        .orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw)
        .await
        .unwrap();
    assert!(outcome.job_handle().is_some());
}

#[tokio::test]
async fn executor_error_is_passed_through() {
    let h = harness(RecordingExecutor {
        reject: true,
        ..RecordingExecutor::default()
    });

    let err = h
        .orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "quota exceeded for project acme-analytics");
    let inner = match err {
        Error::Submission(inner) => inner,
        other => panic!("expected submission error, got {other:?}"),
    };
    let quota = inner.downcast_ref::<QuotaError>().expect("executor error type");
    assert_eq!(quota.project, "acme-analytics");
}

#[tokio::test]
async fn translation_failure_surfaces_in_dry_run() {
    let h = harness(RecordingExecutor::default());
    let raw = RawOptions {
        job_name: "Not_A_Legal_Name".into(),
        dry_run: true,
        ..raw()
    };

    let err = h
        .orchestrator
        .execute(&RunContext::new(), &PIPELINE, &raw)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Translation(_)));
}

#[tokio::test]
async fn cancelling_the_context_aborts_submission() {
    let h = harness(RecordingExecutor {
        hang: true,
        ..RecordingExecutor::default()
    });
    let ctx = RunContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = h
        .orchestrator
        .execute(&ctx, &PIPELINE, &raw())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { step: "job submission" }));
    assert_eq!(h.executor.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn shared_namer_keeps_staging_names_distinct() {
    let namer = Arc::new(ArtifactNamer::new());
    let first = harness(RecordingExecutor::default());
    let second = harness(RecordingExecutor::default());
    let first_orchestrator = first.orchestrator.with_namer(Arc::clone(&namer));
    let second_orchestrator = second.orchestrator.with_namer(Arc::clone(&namer));

    let ctx = RunContext::new();
    let raw = raw();
    let (a, b) = tokio::join!(
        first_orchestrator.execute(&ctx, &PIPELINE, &raw),
        second_orchestrator.execute(&ctx, &PIPELINE, &raw),
    );
    a.unwrap();
    b.unwrap();

    let a = first.executor.calls.lock().unwrap()[0].model_location.clone();
    let b = second.executor.calls.lock().unwrap()[0].model_location.clone();
    assert_ne!(a, b);
    assert_eq!(namer.next_id(), 3);
}

#[tokio::test]
async fn default_orchestrators_share_the_process_namer() {
    let first = harness(RecordingExecutor::default());
    let second = harness(RecordingExecutor::default());
    let ctx = RunContext::new();
    let (raw_a, raw_b) = (raw(), raw());

    let (a, b) = tokio::join!(
        first.orchestrator.execute(&ctx, &PIPELINE, &raw_a),
        second.orchestrator.execute(&ctx, &PIPELINE, &raw_b),
    );
    a.unwrap();
    b.unwrap();

    let a = first.executor.calls.lock().unwrap()[0].clone();
    let b = second.executor.calls.lock().unwrap()[0].clone();
    assert_ne!(a.plan_id, b.plan_id);
    assert_ne!(a.model_location, b.model_location);
}
