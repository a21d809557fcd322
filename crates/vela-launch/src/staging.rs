//! Artifact staging.
//!
//! Uploads a launch's model and optional worker payload to the locations
//! named by its [`StagingPlan`]. Executors call this before submitting.

use vela_core::{ObjectLocation, ObjectMeta, StorageBackend};

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::model::PortableModel;
use crate::naming::StagingPlan;
use crate::options::LaunchConfiguration;

/// Objects written by [`stage_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifacts {
    /// The serialized model.
    pub model: ObjectMeta,
    /// The worker payload, if one was configured.
    pub worker: Option<ObjectMeta>,
}

/// Writes the model and worker payload for one launch.
///
/// The worker payload is streamed from disk rather than read into memory.
///
/// # Errors
///
/// Returns [`Error::Storage`] if a plan location is not a `gs://` URI, the
/// worker payload cannot be opened, or an upload fails, and
/// [`Error::Cancelled`] / [`Error::DeadlineExceeded`] if `ctx` interrupts an
/// upload.
pub async fn stage_artifacts(
    ctx: &RunContext,
    storage: &dyn StorageBackend,
    model: &PortableModel,
    config: &LaunchConfiguration,
    plan: &StagingPlan,
) -> Result<StagedArtifacts> {
    let bytes = model.to_bytes().map_err(|e| Error::Internal {
        message: format!("failed to serialize model: {e}"),
    })?;
    let target = ObjectLocation::parse(&plan.model_location)?;
    let model_meta = ctx
        .run("model staging", storage.put(target.bucket(), target.object(), bytes))
        .await??;
    tracing::info!(location = %plan.model_location, size = model_meta.size, "staged model");

    let worker = match config.worker_binary() {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                vela_core::Error::storage_with_source(
                    format!("failed to open worker binary {}", path.display()),
                    e,
                )
            })?;
            let target = ObjectLocation::parse(&plan.worker_location)?;
            let meta = ctx
                .run(
                    "worker staging",
                    storage.put_stream(target.bucket(), target.object(), Box::new(file)),
                )
                .await??;
            tracing::info!(location = %plan.worker_location, size = meta.size, "staged worker binary");
            Some(meta)
        }
        None => None,
    };

    Ok(StagedArtifacts {
        model: model_meta,
        worker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ArtifactNamer;
    use crate::options::{FixedImageResolver, RawOptions, resolve};
    use std::io::Write;
    use vela_core::MemoryBackend;

    async fn config(raw: RawOptions) -> LaunchConfiguration {
        resolve(&RunContext::new(), &raw, &FixedImageResolver::new("img:1"))
            .await
            .unwrap()
    }

    fn raw() -> RawOptions {
        RawOptions {
            project: "acme".into(),
            staging_location: "gs://acme-staging/jobs".into(),
            ..RawOptions::default()
        }
    }

    #[tokio::test]
    async fn stages_model_only_without_worker_binary() {
        let backend = MemoryBackend::new();
        let config = config(raw()).await;
        let plan = ArtifactNamer::new().next_staging_plan(config.staging_location());
        let model = PortableModel::new(serde_json::json!({"transforms": {}}), "img:1");

        let staged = stage_artifacts(&RunContext::new(), &backend, &model, &config, &plan)
            .await
            .unwrap();

        assert!(staged.worker.is_none());
        assert_eq!(staged.model.bucket, "acme-staging");
        let stored = backend.get("acme-staging", &staged.model.path).await.unwrap();
        let round: PortableModel = serde_json::from_slice(&stored).unwrap();
        assert_eq!(round, model);
    }

    #[tokio::test]
    async fn streams_worker_binary() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x7fELF worker").unwrap();

        let backend = MemoryBackend::new();
        let config = config(RawOptions {
            worker_binary: Some(file.path().to_path_buf()),
            ..raw()
        })
        .await;
        let plan = ArtifactNamer::new().next_staging_plan(config.staging_location());
        let model = PortableModel::new(serde_json::json!({}), "img:1");

        let staged = stage_artifacts(&RunContext::new(), &backend, &model, &config, &plan)
            .await
            .unwrap();

        let worker = staged.worker.unwrap();
        assert!(worker.path.starts_with("jobs/worker-1-"));
        let stored = backend.get("acme-staging", &worker.path).await.unwrap();
        assert_eq!(&stored[..], b"\x7fELF worker");
    }

    #[tokio::test]
    async fn missing_worker_binary_is_a_storage_error() {
        let backend = MemoryBackend::new();
        let config = config(RawOptions {
            worker_binary: Some("/nonexistent/worker".into()),
            ..raw()
        })
        .await;
        let plan = ArtifactNamer::new().next_staging_plan(config.staging_location());
        let model = PortableModel::new(serde_json::json!({}), "img:1");

        let err = stage_artifacts(&RunContext::new(), &backend, &model, &config, &plan)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.to_string().contains("/nonexistent/worker"));
    }
}
