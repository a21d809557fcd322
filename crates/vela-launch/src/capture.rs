//! Object storage capture sink.
//!
//! [`StorageCaptureSink`] is the hook behind [`PROFILE_WRITER_HOOK`]: every
//! captured stream becomes one object at `<prefix>/<spec>` in the bucket
//! named by the destination it was enabled with.

use std::sync::Arc;

use async_trait::async_trait;

use vela_core::{
    ByteReader, ObjectLocation, StorageClientFactory, StorageScope, join_object_path,
};

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::hooks::{CaptureHook, HookFactory, HookRegistry};

/// Hook name the profile writer is registered under.
pub const PROFILE_WRITER_HOOK: &str = "gcs_profile_writer";

/// Registers [`StorageCaptureSink`] under [`PROFILE_WRITER_HOOK`].
///
/// # Errors
///
/// Returns [`Error::DuplicateHook`] if the name is already taken.
pub fn register_profile_writer(
    registry: &HookRegistry,
    clients: Arc<dyn StorageClientFactory>,
) -> Result<()> {
    registry.register(PROFILE_WRITER_HOOK, StorageCaptureSink::factory(clients))
}

/// Writes captured streams to object storage.
///
/// The only state shared between invocations is the immutable destination.
/// A storage client is obtained per capture.
pub struct StorageCaptureSink {
    destination: ObjectLocation,
    clients: Arc<dyn StorageClientFactory>,
}

impl std::fmt::Debug for StorageCaptureSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCaptureSink")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl StorageCaptureSink {
    /// Creates a sink writing under `destination` (a `gs://bucket/prefix` URI).
    ///
    /// # Errors
    ///
    /// Returns [`Error::HookConfiguration`] if `destination` cannot be split
    /// into a bucket and prefix.
    pub fn new(destination: &str, clients: Arc<dyn StorageClientFactory>) -> Result<Self> {
        let destination = ObjectLocation::parse(destination)
            .map_err(|e| Error::hook_configuration(PROFILE_WRITER_HOOK, e.to_string()))?;
        Ok(Self {
            destination,
            clients,
        })
    }

    /// Returns a factory for registering this sink with a
    /// [`HookRegistry`](crate::hooks::HookRegistry).
    ///
    /// The factory expects the destination URI as its first argument.
    #[must_use]
    pub fn factory(clients: Arc<dyn StorageClientFactory>) -> HookFactory {
        Arc::new(move |args: &[String]| {
            let destination = args.first().ok_or_else(|| {
                Error::hook_configuration(PROFILE_WRITER_HOOK, "missing destination argument")
            })?;
            let sink = Self::new(destination, Arc::clone(&clients))?;
            Ok(Arc::new(sink) as Arc<dyn CaptureHook>)
        })
    }

    /// Bucket captured objects are written to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        self.destination.bucket()
    }

    /// Object path a capture named `spec` is written to.
    #[must_use]
    pub fn object_path(&self, spec: &str) -> String {
        join_object_path(self.destination.object(), spec)
    }
}

#[async_trait]
impl CaptureHook for StorageCaptureSink {
    async fn capture(&self, ctx: &RunContext, spec: &str, reader: ByteReader) -> Result<()> {
        let client = ctx
            .run("storage client", self.clients.connect(StorageScope::ReadWrite))
            .await?
            .map_err(Error::StorageClient)?;

        let path = self.object_path(spec);
        let meta = ctx
            .run("capture upload", client.put_stream(self.bucket(), &path, reader))
            .await??;

        tracing::debug!(
            bucket = %meta.bucket,
            path = %meta.path,
            size = meta.size,
            "captured stream written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::{MemoryClientFactory, StorageBackend};

    #[test]
    fn object_path_joins_prefix_and_spec() {
        let sink = StorageCaptureSink::new(
            "gs://diagnostics/profiles/run42",
            Arc::new(MemoryClientFactory::default()),
        )
        .unwrap();
        assert_eq!(sink.bucket(), "diagnostics");
        assert_eq!(sink.object_path("trace-1"), "profiles/run42/trace-1");
    }

    #[test]
    fn bucket_root_destination() {
        let sink =
            StorageCaptureSink::new("gs://diagnostics", Arc::new(MemoryClientFactory::default()))
                .unwrap();
        assert_eq!(sink.object_path("trace-1"), "trace-1");
    }

    #[test]
    fn unparseable_destination_is_a_configuration_error() {
        let err = StorageCaptureSink::new("/local/profiles", Arc::new(MemoryClientFactory::default()))
            .unwrap_err();
        assert!(matches!(err, Error::HookConfiguration { .. }));
    }

    #[test]
    fn factory_requires_destination() {
        let factory = StorageCaptureSink::factory(Arc::new(MemoryClientFactory::default()));
        assert!(matches!(factory(&[]), Err(Error::HookConfiguration { .. })));
        assert!(factory(&["gs://b/p".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn capture_writes_object() {
        let clients = MemoryClientFactory::default();
        let sink = StorageCaptureSink::new("gs://diagnostics/profiles", Arc::new(clients.clone()))
            .unwrap();

        sink.capture(&RunContext::new(), "cpu-0001", Box::new(&b"pprof"[..]))
            .await
            .unwrap();

        let data = clients
            .backend()
            .get("diagnostics", "profiles/cpu-0001")
            .await
            .unwrap();
        assert_eq!(&data[..], b"pprof");
    }
}
