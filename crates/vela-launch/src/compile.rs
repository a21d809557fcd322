//! Graph compilation contract.
//!
//! Turning a pipeline into a [`PortableModel`] is the job of an external
//! graph compiler. The launcher only needs the [`GraphCompiler`] seam; the
//! bundled [`DocumentCompiler`] covers pipelines that were already
//! exported as JSON documents.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::BoxError;
use crate::model::PortableModel;

/// Parameters the launcher passes to the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Container image the workers boot from.
    pub container_image: String,
}

/// Produces a portable model from a pipeline handle of type `P`.
#[async_trait]
pub trait GraphCompiler<P: ?Sized + Sync>: Send + Sync {
    /// Compiles `pipeline` into a portable model.
    async fn compile(
        &self,
        ctx: &RunContext,
        pipeline: &P,
        options: &CompileOptions,
    ) -> std::result::Result<PortableModel, BoxError>;
}

/// A pipeline graph exported ahead of time as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDocument {
    /// The transform graph. Must be an object with a non-empty `transforms` map.
    pub pipeline: serde_json::Value,
    /// Runner capabilities the graph depends on.
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl PipelineDocument {
    /// Reads a document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a pipeline document.
    pub async fn from_path(path: &Path) -> std::result::Result<Self, BoxError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read pipeline document {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Compiler for [`PipelineDocument`]s: validates the graph and stamps the
/// worker environment onto it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCompiler;

#[async_trait]
impl GraphCompiler<PipelineDocument> for DocumentCompiler {
    async fn compile(
        &self,
        _ctx: &RunContext,
        document: &PipelineDocument,
        options: &CompileOptions,
    ) -> std::result::Result<PortableModel, BoxError> {
        let transforms = document
            .pipeline
            .get("transforms")
            .and_then(serde_json::Value::as_object)
            .ok_or("pipeline has no transforms map")?;
        if transforms.is_empty() {
            return Err("pipeline has no transforms".into());
        }

        let mut model = PortableModel::new(document.pipeline.clone(), &options.container_image);
        model.requirements.clone_from(&document.requirements);
        Ok(model)
    }
}
