//! # vela-launch
//!
//! Job launching for vela: everything between "here is a pipeline and some
//! flags" and "here is a submitted job".
//!
//! - **Options**: validation and defaulting of launch flags into an
//!   immutable [`LaunchConfiguration`](options::LaunchConfiguration)
//! - **Naming**: collision-free staging locations for model and worker artifacts
//! - **Capture hooks**: a registry of named byte-stream sinks, including the
//!   `gcs_profile_writer` object storage sink
//! - **Orchestration**: compile, plan, then preview or submit
//!
//! Graph compilation, translation and execution are collaborator traits;
//! [`DocumentCompiler`](compile::DocumentCompiler) and
//! [`DataflowTranslator`](translate::DataflowTranslator) ship with the crate,
//! and the Dataflow REST executor is available behind the `gcp` feature.
//!
//! ## Example
//!
//! ```rust
//! use vela_launch::prelude::*;
//!
//! # async fn demo() -> vela_launch::error::Result<()> {
//! let raw = RawOptions {
//!     project: "acme".into(),
//!     staging_location: "gs://acme-staging/jobs".into(),
//!     worker_image: "registry.example/worker:1".into(),
//!     ..RawOptions::default()
//! };
//! let config = resolve(&RunContext::new(), &raw, &FixedImageResolver::new("unused")).await?;
//! assert_eq!(config.temp_location(), "gs://acme-staging/jobs/tmp");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod capture;
pub mod compile;
pub mod context;
#[cfg(feature = "gcp")]
pub mod dataflow;
pub mod error;
pub mod execute;
pub mod hooks;
pub mod model;
pub mod naming;
pub mod options;
pub mod orchestrator;
pub mod staging;
pub mod translate;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::capture::{PROFILE_WRITER_HOOK, StorageCaptureSink, register_profile_writer};
    pub use crate::compile::{CompileOptions, DocumentCompiler, GraphCompiler, PipelineDocument};
    pub use crate::context::RunContext;
    pub use crate::error::{BoxError, Error, Result};
    pub use crate::execute::{JobExecutor, JobHandle, JobState, SubmitJob};
    pub use crate::hooks::{CaptureHook, HookFactory, HookRegistry};
    pub use crate::model::{PipelineOptions, PortableModel};
    pub use crate::naming::{ArtifactNamer, StagingPlan};
    pub use crate::options::{
        FixedImageResolver, ImageResolver, LaunchConfiguration, RawOptions, resolve,
    };
    pub use crate::orchestrator::{Outcome, SubmissionOrchestrator};
    pub use crate::translate::{DataflowTranslator, JobDescription, JobPreview, JobTranslator};
}

pub use error::{Error, Result};
pub use orchestrator::{Outcome, SubmissionOrchestrator};
