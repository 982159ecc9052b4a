//! Optional off-site copy of a finished archive.
//!
//! The archive is posted as one JSON document with the bytes base64-encoded.
//! Upload failures are never fatal to a backup; the caller only logs them.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bugtrack_core::config::DEFAULT_UPLOAD_TIMEOUT_MS;
use bugtrack_core::{Clock, SystemClock, error_chain, iso8601};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read archive {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload request failed: {0}")]
    Network(String),

    #[error("upload rejected with status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Network(error_chain(&e))
    }
}

/// Body of the upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    /// Archive bytes, base64 (standard alphabet, padded).
    pub file: String,
    pub file_name: String,
    pub timestamp: String,
}

impl UploadPayload {
    pub fn new(file_name: impl Into<String>, bytes: &[u8], timestamp: String) -> Self {
        Self {
            file: STANDARD.encode(bytes),
            file_name: file_name.into(),
            timestamp,
        }
    }
}

/// Ships an archive somewhere off the host.
pub trait Uploader: Send + Sync {
    fn upload(&self, archive: &Path) -> impl Future<Output = Result<(), UploadError>> + Send;
}

/// Posts archives to an HTTP endpoint.
#[derive(Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
    clock: Arc<dyn Clock>,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: client_with_timeout(Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS)),
            url: url.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Abandon a request that has not completed within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = client_with_timeout(timeout);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn client_with_timeout(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "upload client unavailable, using defaults");
            reqwest::Client::new()
        })
}

impl Uploader for HttpUploader {
    async fn upload(&self, archive: &Path) -> Result<(), UploadError> {
        let bytes = tokio::fs::read(archive)
            .await
            .map_err(|source| UploadError::Read {
                path: archive.to_path_buf(),
                source,
            })?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(%file_name, size = bytes.len(), url = %self.url, "uploading archive");
        let payload = UploadPayload::new(file_name, &bytes, iso8601(self.clock.now()));

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(UploadError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_encodes_bytes_and_camel_cases_fields() {
        let payload = UploadPayload::new(
            "backup-x.gz",
            b"hello",
            "2024-01-01T00:00:00.000Z".to_string(),
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["file"], "aGVsbG8=");
        assert_eq!(json["fileName"], "backup-x.gz");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn missing_archive_is_a_read_error() {
        let uploader = HttpUploader::new("http://127.0.0.1:1/upload");
        let err = uploader
            .upload(Path::new("/nonexistent/backup-x.gz"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Read { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("backup-x.gz");
        std::fs::write(&archive, b"data").unwrap();

        let uploader = HttpUploader::new("http://127.0.0.1:1/upload");
        let err = uploader.upload(&archive).await.unwrap_err();
        assert!(matches!(err, UploadError::Network(_)));
    }
}
