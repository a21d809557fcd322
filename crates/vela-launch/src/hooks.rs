//! Capture hook registry.
//!
//! Hooks are registered by name once at startup, enabled with concrete
//! arguments (at most once per run; enabling again replaces the previous
//! arguments), and then invoked any number of times. The registry is an
//! explicit value handed to the orchestrator, not process-global state.
//!
//! Enabled hooks are exported into the pipeline options under
//! [`HOOKS_OPTION_KEY`] so workers can re-enable them on their side.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::Instrument;

use vela_core::ByteReader;
use vela_core::observability::capture_span;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::model::PipelineOptions;

/// Pipeline option key enabled hooks are exported under.
pub const HOOKS_OPTION_KEY: &str = "hooks";

/// A named sink for an in-flight byte stream.
///
/// Invocations are independent of each other and may run concurrently.
#[async_trait]
pub trait CaptureHook: Send + Sync {
    /// Persists the whole of `reader` under the logical name `spec`.
    async fn capture(&self, ctx: &RunContext, spec: &str, reader: ByteReader) -> Result<()>;
}

/// Builds a hook from its enable-time arguments.
///
/// Factories validate their arguments eagerly; a bad argument fails
/// [`HookRegistry::enable`] rather than the first capture.
pub type HookFactory = Arc<dyn Fn(&[String]) -> Result<Arc<dyn CaptureHook>> + Send + Sync>;

struct EnabledHook {
    args: Vec<String>,
    hook: Arc<dyn CaptureHook>,
}

/// Registry of named capture hooks.
#[derive(Default)]
pub struct HookRegistry {
    factories: RwLock<BTreeMap<String, HookFactory>>,
    enabled: RwLock<BTreeMap<String, EnabledHook>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("registered", &self.registered().unwrap_or_default())
            .field("enabled", &self.enabled().unwrap_or_default())
            .finish()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Internal {
        message: "hook registry lock poisoned".into(),
    }
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateHook`] if the name is taken.
    pub fn register(&self, name: impl Into<String>, factory: HookFactory) -> Result<()> {
        let name = name.into();
        let mut factories = self.factories.write().map_err(poisoned)?;
        if factories.contains_key(&name) {
            return Err(Error::DuplicateHook { name });
        }
        tracing::debug!(hook = %name, "registered capture hook");
        factories.insert(name, factory);
        Ok(())
    }

    /// Enables `name` with `args`, replacing any earlier arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHook`] if nothing is registered under `name`,
    /// or the factory's error (typically [`Error::HookConfiguration`]) if the
    /// arguments are rejected.
    pub fn enable(&self, name: &str, args: Vec<String>) -> Result<()> {
        let factory = self
            .factories
            .read()
            .map_err(poisoned)?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownHook {
                name: name.to_string(),
            })?;

        let hook = factory(&args)?;
        tracing::info!(hook = %name, args = ?args, "enabled capture hook");
        self.enabled
            .write()
            .map_err(poisoned)?
            .insert(name.to_string(), EnabledHook { args, hook });
        Ok(())
    }

    /// Returns the enabled hook registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownHook`] or [`Error::HookNotEnabled`].
    pub fn hook(&self, name: &str) -> Result<Arc<dyn CaptureHook>> {
        if let Some(enabled) = self.enabled.read().map_err(poisoned)?.get(name) {
            return Ok(Arc::clone(&enabled.hook));
        }
        if self.factories.read().map_err(poisoned)?.contains_key(name) {
            Err(Error::HookNotEnabled {
                name: name.to_string(),
            })
        } else {
            Err(Error::UnknownHook {
                name: name.to_string(),
            })
        }
    }

    /// Names of all registered hooks, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the registry lock is poisoned.
    pub fn registered(&self) -> Result<Vec<String>> {
        Ok(self.factories.read().map_err(poisoned)?.keys().cloned().collect())
    }

    /// Enabled hooks and their arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the registry lock is poisoned.
    pub fn enabled(&self) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(self
            .enabled
            .read()
            .map_err(poisoned)?
            .iter()
            .map(|(name, hook)| (name.clone(), hook.args.clone()))
            .collect())
    }

    /// Writes the enabled hooks into `options` under [`HOOKS_OPTION_KEY`].
    ///
    /// Leaves `options` untouched when no hook is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HookSerialization`] if the hook arguments cannot be
    /// encoded.
    pub fn export_into(&self, options: &mut PipelineOptions) -> Result<()> {
        let enabled = self.enabled()?;
        if enabled.is_empty() {
            return Ok(());
        }
        let value =
            serde_json::to_value(&enabled).map_err(|source| Error::HookSerialization { source })?;
        options.insert(HOOKS_OPTION_KEY, value);
        Ok(())
    }

    /// Streams `reader` through the enabled hook `name`.
    ///
    /// The registry lock is released before the hook runs.
    ///
    /// # Errors
    ///
    /// Returns lookup errors from [`HookRegistry::hook`] or the hook's own
    /// failure. Failures are logged; they never affect a running job.
    pub async fn capture(
        &self,
        ctx: &RunContext,
        name: &str,
        spec: &str,
        reader: ByteReader,
    ) -> Result<()> {
        let hook = self.hook(name)?;
        let result = hook
            .capture(ctx, spec, reader)
            .instrument(capture_span(name, spec))
            .await;
        if let Err(err) = &result {
            tracing::warn!(hook = %name, spec = %spec, error = %err, "capture failed");
        }
        result
    }
}
