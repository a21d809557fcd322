//! Portable pipeline model and exported pipeline options.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Runner-agnostic description of a pipeline's computation graph.
///
/// Produced by a [`GraphCompiler`](crate::compile::GraphCompiler) and
/// staged verbatim for the remote service to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableModel {
    /// Transforms, collections and coders, in the compiler's wire shape.
    pub pipeline: serde_json::Value,
    /// Environment the workers run the pipeline in.
    pub environment: ModelEnvironment,
    /// Capabilities the runner must support to execute this model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,
}

/// Worker environment embedded in a [`PortableModel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEnvironment {
    /// Container image the workers boot from.
    pub container_image: String,
}

impl PortableModel {
    /// Creates a model for `pipeline` running in `container_image`.
    #[must_use]
    pub fn new(pipeline: serde_json::Value, container_image: impl Into<String>) -> Self {
        Self {
            pipeline,
            environment: ModelEnvironment {
                container_image: container_image.into(),
            },
            requirements: Vec::new(),
        }
    }

    /// Serializes the model for staging.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline value cannot be serialized.
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Human-readable text form, used when previewing a job.
impl fmt::Display for PortableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Generic pipeline options exported to the workers.
///
/// Opaque to the launcher: values are passed through to the job
/// description unchanged, apart from the `hooks` entry written by the
/// [`HookRegistry`](crate::hooks::HookRegistry).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineOptions(BTreeMap<String, serde_json::Value>);

impl PipelineOptions {
    /// Creates an empty option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.0.insert(key.into(), value)
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Number of options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, serde_json::Value)> for PipelineOptions {
    fn from_iter<I: IntoIterator<Item = (K, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_text_form_is_pretty_json() {
        let model = PortableModel::new(json!({"transforms": {"t1": {}}}), "worker:1");
        let text = model.to_string();
        assert!(text.contains('\n'));
        assert!(text.contains("\"containerImage\": \"worker:1\""));
    }

    #[test]
    fn model_bytes_parse_back() {
        let model = PortableModel::new(json!({"transforms": {}}), "worker:1");
        let bytes = model.to_bytes().unwrap();
        let parsed: PortableModel = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, model);
    }

    #[test]
    fn options_serialize_as_flat_object() {
        let opts: PipelineOptions = [("b", json!(2)), ("a", json!("x"))].into_iter().collect();
        assert_eq!(serde_json::to_string(&opts).unwrap(), r#"{"a":"x","b":2}"#);
    }
}
