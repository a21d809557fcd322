//! Storage and executor wiring.
//!
//! With the `gcp` feature the CLI talks to Cloud Storage and Dataflow.
//! Without it, dry runs still work; anything that needs the remote service
//! fails with an explanatory error.

use std::sync::Arc;
use std::time::Duration;

use vela_core::StorageClientFactory;
use vela_launch::context::RunContext;
use vela_launch::execute::JobExecutor;

/// Builds the storage client factory used for staging and captures.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
#[cfg(feature = "gcp")]
pub fn storage_clients() -> anyhow::Result<Arc<dyn StorageClientFactory>> {
    Ok(Arc::new(vela_core::gcs::GcsClientFactory::new()?))
}

/// Builds the storage client factory used for staging and captures.
///
/// # Errors
///
/// Never fails; the returned factory refuses every connection.
#[cfg(not(feature = "gcp"))]
pub fn storage_clients() -> anyhow::Result<Arc<dyn StorageClientFactory>> {
    Ok(Arc::new(disabled::DisabledStorage))
}

/// Builds the job executor.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
#[cfg(feature = "gcp")]
pub fn executor(clients: Arc<dyn StorageClientFactory>) -> anyhow::Result<Arc<dyn JobExecutor>> {
    Ok(Arc::new(vela_launch::dataflow::DataflowExecutor::new(clients)?))
}

/// Builds the job executor.
///
/// # Errors
///
/// Never fails; the returned executor refuses every submission.
#[cfg(not(feature = "gcp"))]
pub fn executor(_clients: Arc<dyn StorageClientFactory>) -> anyhow::Result<Arc<dyn JobExecutor>> {
    Ok(Arc::new(disabled::DisabledExecutor))
}

/// Creates a run context that is cancelled on Ctrl-C and, if `timeout` is
/// set, expires after it.
pub fn run_context(timeout: Option<Duration>) -> RunContext {
    let ctx = match timeout {
        Some(timeout) => RunContext::new().with_timeout(timeout),
        None => RunContext::new(),
    };

    let canceller = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling in-flight calls");
            canceller.cancel();
        }
    });
    ctx
}

#[cfg(not(feature = "gcp"))]
mod disabled {
    use std::sync::Arc;

    use async_trait::async_trait;

    use vela_core::{StorageBackend, StorageClientFactory, StorageScope};
    use vela_launch::context::RunContext;
    use vela_launch::error::BoxError;
    use vela_launch::execute::{JobExecutor, JobHandle, SubmitJob};

    #[derive(Debug)]
    pub(super) struct DisabledStorage;

    #[async_trait]
    impl StorageClientFactory for DisabledStorage {
        async fn connect(&self, _scope: StorageScope) -> vela_core::Result<Arc<dyn StorageBackend>> {
            Err(vela_core::Error::configuration(
                "object storage access requires the 'gcp' feature",
            ))
        }
    }

    #[derive(Debug)]
    pub(super) struct DisabledExecutor;

    #[async_trait]
    impl JobExecutor for DisabledExecutor {
        async fn submit(&self, _ctx: &RunContext, _job: SubmitJob<'_>) -> Result<JobHandle, BoxError> {
            Err("job submission requires the 'gcp' feature; use --dry-run to preview".into())
        }
    }
}
