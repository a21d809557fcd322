//! Error types for job launching.
//!
//! Each variant identifies the step that failed: option validation, hook
//! setup, model compilation, translation, storage, or submission. Errors
//! from collaborators are kept as the `#[source]` of the wrapping variant;
//! errors from the job executor are passed through untouched.

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The result type used throughout vela-launch.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while launching a job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required launch option was empty.
    #[error("no {field} specified. {hint}")]
    MissingRequiredField {
        /// Human-readable name of the missing field.
        field: &'static str,
        /// How to supply it.
        hint: &'static str,
    },

    /// The labels option was not a JSON object of string values.
    #[error("error reading --labels flag as JSON: {source}")]
    InvalidLabelFormat {
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The worker image could not be resolved.
    #[error("failed to resolve worker image: {0}")]
    ImageResolution(#[source] BoxError),

    /// A capture hook could not be configured from its arguments.
    #[error("invalid configuration for hook {hook}: {message}")]
    HookConfiguration {
        /// Hook name.
        hook: String,
        /// Description of the problem.
        message: String,
    },

    /// A hook name was enabled or looked up without being registered.
    #[error("hook {name} is not registered")]
    UnknownHook {
        /// Hook name.
        name: String,
    },

    /// A hook name was registered twice.
    #[error("hook {name} is already registered")]
    DuplicateHook {
        /// Hook name.
        name: String,
    },

    /// A hook was invoked before being enabled.
    #[error("hook {name} is registered but not enabled")]
    HookNotEnabled {
        /// Hook name.
        name: String,
    },

    /// Enabled hooks could not be exported into pipeline options.
    #[error("failed to serialize hooks into pipeline options: {source}")]
    HookSerialization {
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The portable model could not be generated from the pipeline.
    #[error("failed to generate model pipeline: {0}")]
    ModelCompilation(#[source] BoxError),

    /// The job description could not be produced from the model.
    #[error("failed to translate job: {0}")]
    Translation(#[source] BoxError),

    /// A storage client could not be established.
    #[error("couldn't establish storage client: {0}")]
    StorageClient(#[source] vela_core::Error),

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] vela_core::Error),

    /// The job executor rejected or failed the submission.
    ///
    /// The executor's error is passed through verbatim; use
    /// `downcast_ref` on the inner value to inspect service-specific detail.
    #[error(transparent)]
    Submission(BoxError),

    /// The run context was cancelled while a step was in flight.
    #[error("{step} cancelled")]
    Cancelled {
        /// The step that was interrupted.
        step: &'static str,
    },

    /// The run context's deadline passed while a step was in flight.
    #[error("{step} exceeded the run deadline")]
    DeadlineExceeded {
        /// The step that was interrupted.
        step: &'static str,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a hook configuration error.
    #[must_use]
    pub fn hook_configuration(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookConfiguration {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Returns true if the run context interrupted the failing step.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }
}
