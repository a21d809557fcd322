//! Error types and result aliases for vela.
//!
//! Errors raised by the storage and location layers. Launch-level failures
//! live in `vela-launch` and wrap these where a storage call is involved.

/// The result type used throughout vela-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vela-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An object location could not be parsed.
    #[error("invalid object location '{location}': {message}")]
    InvalidLocation {
        /// The location string as given.
        location: String,
        /// Description of what made the location invalid.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A client or backend was misconfigured.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new invalid location error.
    #[must_use]
    pub fn invalid_location(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLocation {
            location: location.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::storage_with_source("upload failed", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn invalid_location_names_input() {
        let err = Error::invalid_location("s3://bucket", "expected gs:// scheme");
        let msg = err.to_string();
        assert!(msg.contains("s3://bucket"));
        assert!(msg.contains("gs://"));
    }
}
