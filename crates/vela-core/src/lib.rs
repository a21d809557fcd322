//! # vela-core
//!
//! Shared primitives for the vela job launcher.
//!
//! This crate provides the pieces every other vela crate builds on:
//!
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//! - **Object Locations**: Parsing and joining of `gs://bucket/path` URIs
//! - **Storage**: The object storage contract, an in-memory backend, and the
//!   GCS backend (behind the `gcp` feature)
//!
//! ## Example
//!
//! ```rust
//! use vela_core::prelude::*;
//!
//! let location = ObjectLocation::parse("gs://my-bucket/staging").unwrap();
//! assert_eq!(location.bucket(), "my-bucket");
//! assert_eq!(join_uri("gs://my-bucket/staging", "tmp"), "gs://my-bucket/staging/tmp");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "gcp")]
pub mod gcs;
pub mod location;
pub mod observability;
pub mod storage;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use vela_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::location::{ObjectLocation, join_object_path, join_uri};
    pub use crate::storage::{
        ByteReader, MemoryBackend, MemoryClientFactory, ObjectMeta, StorageBackend,
        StorageClientFactory, StorageScope,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use location::{ObjectLocation, join_object_path, join_uri};
pub use observability::{LogFormat, init_logging};
pub use storage::{
    ByteReader, MemoryBackend, MemoryClientFactory, ObjectMeta, StorageBackend,
    StorageClientFactory, StorageScope,
};
