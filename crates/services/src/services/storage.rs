//! Image storage: local filesystem under the public uploads directory, or a hosted
//! blob store addressed by URL.

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob store request failed: {0}")]
    Transport(String),
    #[error("blob store returned http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("url is not managed by this storage backend: {0}")]
    ForeignUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub url: String,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Blob,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores `bytes` as `<folder>/<file_name>` and returns its public URL.
    async fn put(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredFile, StorageError>;

    /// Removes a previously stored file. Deleting something already gone succeeds.
    async fn delete(&self, url: &str) -> Result<(), StorageError>;

    fn backend(&self) -> StorageBackend;
}

pub type SharedStorage = Arc<dyn FileStorage>;

/// Picks the hosted blob store when a token is configured, the local uploads
/// directory otherwise.
pub fn storage_from_config(config: &StorageConfig) -> Result<SharedStorage, StorageError> {
    match &config.blob_token {
        Some(token) => {
            info!(api = %config.blob_api_url, "Using hosted blob storage");
            Ok(Arc::new(BlobStorage::new(config.blob_api_url.clone(), token.clone())?))
        }
        None => {
            info!(dir = %config.uploads_dir.display(), "Using local file storage");
            Ok(Arc::new(LocalStorage::new(
                config.uploads_dir.clone(),
                config.public_prefix.clone(),
            )))
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_prefix: String,
}

impl LocalStorage {
    pub fn new(root: PathBuf, public_prefix: impl Into<String>) -> Self {
        let public_prefix = public_prefix.into().trim_end_matches('/').to_string();
        Self { root, public_prefix }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a public URL back onto the uploads directory, rejecting anything that
    /// could escape it.
    fn path_for_url(&self, url: &str) -> Result<PathBuf, StorageError> {
        let relative = url
            .strip_prefix(&self.public_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))?;
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::ForeignUrl(url.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn put(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<StoredFile, StorageError> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Stored upload on disk");

        Ok(StoredFile {
            url: format!("{}/{}/{}", self.public_prefix, folder, file_name),
            size: bytes.len(),
        })
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let path = self.path_for_url(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Upload already removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[derive(Debug, Deserialize)]
struct BlobPutResponse {
    url: String,
}

/// Client for a hosted blob store with a PUT-by-pathname / POST-delete API.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    http: Client,
    api_url: String,
    token: SecretString,
}

impl BlobStorage {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(api_url: String, token: SecretString) -> Result<Self, StorageError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("quran-center/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        match res.status() {
            s if s.is_success() => Ok(res),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(StorageError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl FileStorage for BlobStorage {
    async fn put(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredFile, StorageError> {
        let size = bytes.len();
        let res = self
            .http
            .put(format!("{}/{}/{}", self.api_url, folder, file_name))
            .bearer_auth(self.token.expose_secret())
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "0")
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let body: BlobPutResponse = Self::check(res)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(StoredFile { url: body.url, size })
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        if url::Url::parse(url).is_err() {
            return Err(StorageError::ForeignUrl(url.to_string()));
        }
        let res = self
            .http
            .post(format!("{}/delete", self.api_url))
            .bearer_auth(self.token.expose_secret())
            .json(&serde_json::json!({ "urls": [url] }))
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if res.status() == StatusCode::NOT_FOUND {
            warn!(url, "Blob already deleted");
            return Ok(());
        }
        Self::check(res).await.map(|_| ())
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Blob
    }
}
