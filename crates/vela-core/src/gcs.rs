//! Google Cloud Storage backend over the JSON API.
//!
//! This module is only compiled when the `gcp` feature is enabled.
//! Credentials are discovered from the environment through `gcp_auth`
//! (service account key, metadata server, or gcloud user credentials).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use gcp_auth::TokenProvider;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};
use crate::storage::{ByteReader, ObjectMeta, StorageBackend, StorageClientFactory, StorageScope};

const API_BASE: &str = "https://storage.googleapis.com";

/// Object resource returned by the JSON API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    bucket: String,
    name: String,
    /// int64 encoded as a string.
    size: String,
    generation: String,
    updated: Option<DateTime<Utc>>,
}

impl GcsObject {
    fn into_meta(self) -> ObjectMeta {
        ObjectMeta {
            size: self.size.parse().unwrap_or_default(),
            bucket: self.bucket,
            path: self.name,
            version: self.generation,
            last_modified: self.updated,
        }
    }
}

/// Builds [`GcsBackend`] clients using ambient GCP credentials.
pub struct GcsClientFactory {
    client: reqwest::Client,
}

impl std::fmt::Debug for GcsClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsClientFactory").finish_non_exhaustive()
    }
}

impl GcsClientFactory {
    /// Creates a factory.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StorageClientFactory for GcsClientFactory {
    async fn connect(&self, scope: StorageScope) -> Result<Arc<dyn StorageBackend>> {
        let token_provider = gcp_auth::provider()
            .await
            .map_err(|e| Error::configuration(format!("failed to initialize GCP auth: {e}")))?;

        // Fail here rather than on first write so callers see credential
        // problems as client construction failures.
        token_provider
            .token(&[scope.oauth_scope()])
            .await
            .map_err(|e| Error::configuration(format!("failed to get GCS access token: {e}")))?;

        Ok(Arc::new(GcsBackend {
            token_provider,
            client: self.client.clone(),
            scope,
        }))
    }
}

/// Storage backend that talks to the GCS JSON API.
pub struct GcsBackend {
    token_provider: Arc<dyn TokenProvider>,
    client: reqwest::Client,
    scope: StorageScope,
}

// Manual Debug implementation since TokenProvider doesn't implement Debug
impl std::fmt::Debug for GcsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsBackend")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl GcsBackend {
    async fn access_token(&self) -> Result<String> {
        let token = self
            .token_provider
            .token(&[self.scope.oauth_scope()])
            .await
            .map_err(|e| Error::storage(format!("failed to get GCS access token: {e}")))?;
        Ok(token.as_str().to_string())
    }

    async fn upload(&self, bucket: &str, path: &str, body: reqwest::Body) -> Result<ObjectMeta> {
        let url = upload_url(bucket, path)?;
        let token = self.access_token().await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::storage_with_source(format!("upload of gs://{bucket}/{path} failed"), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::storage(format!(
                "upload of gs://{bucket}/{path} failed (status={status}): {body}"
            )));
        }

        let object: GcsObject = response
            .json()
            .await
            .map_err(|e| Error::storage_with_source("failed to parse upload response", e))?;
        Ok(object.into_meta())
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    async fn get(&self, bucket: &str, path: &str) -> Result<Bytes> {
        let mut url = object_url(bucket, path)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let token = self.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::storage_with_source(format!("read of gs://{bucket}/{path} failed"), e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("gs://{bucket}/{path}"))),
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| Error::storage_with_source("failed to read object body", e)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::storage(format!(
                    "read of gs://{bucket}/{path} failed (status={status}): {body}"
                )))
            }
        }
    }

    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> Result<ObjectMeta> {
        self.upload(bucket, path, reqwest::Body::from(data)).await
    }

    async fn put_stream(&self, bucket: &str, path: &str, reader: ByteReader) -> Result<ObjectMeta> {
        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
        self.upload(bucket, path, body).await
    }

    async fn head(&self, bucket: &str, path: &str) -> Result<Option<ObjectMeta>> {
        let url = object_url(bucket, path)?;
        let token = self.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::storage_with_source(format!("stat of gs://{bucket}/{path} failed"), e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let object: GcsObject = response
                    .json()
                    .await
                    .map_err(|e| Error::storage_with_source("failed to parse object metadata", e))?;
                Ok(Some(object.into_meta()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::storage(format!(
                    "stat of gs://{bucket}/{path} failed (status={status}): {body}"
                )))
            }
        }
    }
}

fn object_url(bucket: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(API_BASE)
        .map_err(|e| Error::configuration(format!("invalid storage endpoint: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| Error::configuration("storage endpoint cannot be a base"))?
        .pop_if_empty()
        .extend(["storage", "v1", "b", bucket, "o", path]);
    Ok(url)
}

fn upload_url(bucket: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(API_BASE)
        .map_err(|e| Error::configuration(format!("invalid storage endpoint: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| Error::configuration("storage endpoint cannot be a base"))?
        .pop_if_empty()
        .extend(["upload", "storage", "v1", "b", bucket, "o"]);
    url.query_pairs_mut()
        .append_pair("uploadType", "media")
        .append_pair("name", path);
    Ok(url)
}
