//! Object storage locations.
//!
//! Staging locations, temp locations and capture destinations are all
//! `gs://bucket/path` URIs. This module parses them into a bucket and an
//! object prefix, and joins further segments onto them.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// URI scheme prefix for Google Cloud Storage.
pub const GCS_SCHEME: &str = "gs://";

/// A parsed `gs://bucket/object` location.
///
/// The object part may be empty (the bucket root) and never carries a
/// leading or trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    bucket: String,
    object: String,
}

impl ObjectLocation {
    /// Parses a `gs://bucket/object` URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLocation`] if the scheme is not `gs://` or
    /// the bucket is empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use vela_core::ObjectLocation;
    ///
    /// let loc = ObjectLocation::parse("gs://profiles/run42").unwrap();
    /// assert_eq!(loc.bucket(), "profiles");
    /// assert_eq!(loc.object(), "run42");
    /// ```
    pub fn parse(uri: &str) -> Result<Self> {
        let Some(rest) = uri.strip_prefix(GCS_SCHEME) else {
            return Err(Error::invalid_location(uri, "expected a gs:// URI"));
        };

        let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(Error::invalid_location(uri, "bucket name is empty"));
        }
        if bucket.contains(['?', '#']) {
            return Err(Error::invalid_location(
                uri,
                "bucket name contains query or fragment characters",
            ));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            object: object.trim_matches('/').to_string(),
        })
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the object path (prefix) inside the bucket.
    #[must_use]
    pub fn object(&self) -> &str {
        &self.object
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.object.is_empty() {
            write!(f, "{GCS_SCHEME}{}", self.bucket)
        } else {
            write!(f, "{GCS_SCHEME}{}/{}", self.bucket, self.object)
        }
    }
}

impl FromStr for ObjectLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Joins `suffix` onto a URI or path.
///
/// The scheme and authority (`gs://bucket`) are kept verbatim. The path is
/// cleaned: empty and `.` segments are dropped, so separators never double,
/// and `..` removes the previous segment but never climbs above the root.
///
/// ```rust
/// use vela_core::join_uri;
///
/// assert_eq!(join_uri("gs://b/staging/", "tmp"), "gs://b/staging/tmp");
/// assert_eq!(join_uri("gs://b/staging", "../../tmp"), "gs://b/tmp");
/// ```
#[must_use]
pub fn join_uri(base: &str, suffix: &str) -> String {
    let (root, path) = split_root(base);

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/').chain(suffix.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");

    if !root.is_empty() {
        if joined.is_empty() {
            root.to_string()
        } else {
            format!("{root}/{joined}")
        }
    } else if path.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Joins an object name onto an object prefix.
///
/// Only the separator between the two is normalized; `..` and `.` are
/// passed through untouched. An empty prefix yields `name` unchanged.
///
/// ```rust
/// use vela_core::join_object_path;
///
/// assert_eq!(join_object_path("profiles/run42", "trace-1"), "profiles/run42/trace-1");
/// assert_eq!(join_object_path("", "trace-1"), "trace-1");
/// ```
#[must_use]
pub fn join_object_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return name.to_string();
    }
    format!("{prefix}/{}", name.trim_start_matches('/'))
}

/// Splits `scheme://authority` off a URI. Plain paths have an empty root.
fn split_root(uri: &str) -> (&str, &str) {
    let Some(scheme_end) = uri.find("://") else {
        return ("", uri);
    };
    let authority_start = scheme_end + 3;
    match uri[authority_start..].find('/') {
        Some(offset) => uri.split_at(authority_start + offset),
        None => (uri, ""),
    }
}
