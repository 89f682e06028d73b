//! HTTP implementation of the sync core's `RemoteCollection` port.
//!
//! The photovault server exposes a JSON API for record metadata and the
//! sequence/lock protocol; image bytes travel through opaque pre-signed
//! targets the server issues, so `put_bytes`/`get_bytes` are plain HTTP
//! against those URLs without further authentication.

use async_trait::async_trait;
use photo_sync::{
    DownloadTarget, ExtendedMetadata, ImageRecord, LockToken, MetadataPatch, RemoteCollection,
    RemoteCursor, SyncError, TombstoneOutcome, UploadTargets,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::SyncSettings;

/// Connection parameters for the photovault server
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub server_url: String,
    pub username: String,
    pub app_password: String,
    pub remote_path: String,
    /// Stable client identity, sent with every API call
    pub device_id: Option<String>,
}

impl From<&SyncSettings> for RemoteConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            server_url: settings.server_url.clone(),
            username: settings.username.clone(),
            app_password: settings.app_password.clone(),
            remote_path: settings.remote_path.clone(),
            device_id: settings.device_id.clone(),
        }
    }
}

pub struct HttpRemoteCollection {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl HttpRemoteCollection {
    pub fn new(config: RemoteConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Other(format!("HTTP client error: {}", e)))?;
        Ok(Self { config, http })
    }

    /// Build an API URL under the collection root
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.config.server_url.trim_end_matches('/'),
            self.config.remote_path.trim_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.basic_auth(&self.config.username, Some(&self.config.app_password));
        match &self.config.device_id {
            Some(id) => builder.header("X-Device-Id", id),
            None => builder,
        }
    }

    async fn expect_success(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_error_status(status, context, &body))
    }
}

/// Map a non-success API status to the sync error taxonomy
fn map_error_status(status: StatusCode, context: &str, body: &str) -> SyncError {
    match status {
        StatusCode::LOCKED | StatusCode::CONFLICT => {
            SyncError::LockContention(format!("{} ({})", context, status))
        }
        _ => SyncError::Remote(format!("{} failed with {}: {}", context, status, body)),
    }
}

fn remote_err(e: reqwest::Error) -> SyncError {
    SyncError::Remote(e.to_string())
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    images: Vec<ImageRecord>,
}

#[derive(Debug, Serialize)]
struct RecordsBody<'a> {
    records: &'a [ImageRecord],
}

#[derive(Debug, Deserialize)]
struct UploadTargetsResponse {
    targets: Vec<UploadTargets>,
}

#[derive(Debug, Serialize)]
struct UuidsBody<'a> {
    uuids: &'a [Uuid],
}

#[derive(Debug, Deserialize)]
struct DownloadTargetsResponse {
    targets: Vec<DownloadTarget>,
}

#[derive(Debug, Serialize)]
struct ExtendedEntry<'a> {
    uuid: Uuid,
    extended: &'a ExtendedMetadata,
}

#[derive(Debug, Serialize)]
struct ExtendedBatchBody<'a> {
    entries: Vec<ExtendedEntry<'a>>,
}

#[derive(Debug, Deserialize)]
struct LockResponse {
    token: Uuid,
}

#[async_trait]
impl RemoteCollection for HttpRemoteCollection {
    async fn list_all_with_metadata(&self) -> Result<Vec<ImageRecord>, SyncError> {
        let response = self
            .authed(self.http.get(self.api_url("images")))
            .send()
            .await
            .map_err(remote_err)?;
        let response = self.expect_success(response, "List images").await?;
        let list: ListResponse = response.json().await.map_err(remote_err)?;
        Ok(list.images)
    }

    async fn request_upload_targets(
        &self,
        records: &[ImageRecord],
    ) -> Result<Vec<UploadTargets>, SyncError> {
        let response = self
            .authed(self.http.post(self.api_url("images/upload-targets")))
            .json(&RecordsBody { records })
            .send()
            .await
            .map_err(remote_err)?;
        let response = self
            .expect_success(response, "Request upload targets")
            .await?;
        let targets: UploadTargetsResponse = response.json().await.map_err(remote_err)?;
        Ok(targets.targets)
    }

    async fn put_bytes(&self, target: &str, bytes: Vec<u8>) -> Result<(), SyncError> {
        let response = self
            .http
            .put(target)
            .body(bytes)
            .send()
            .await
            .map_err(remote_err)?;
        self.expect_success(response, "Upload bytes").await?;
        Ok(())
    }

    async fn request_download_targets(
        &self,
        uuids: &[Uuid],
    ) -> Result<Vec<DownloadTarget>, SyncError> {
        let response = self
            .authed(self.http.post(self.api_url("images/download-targets")))
            .json(&UuidsBody { uuids })
            .send()
            .await
            .map_err(remote_err)?;
        let response = self
            .expect_success(response, "Request download targets")
            .await?;
        let targets: DownloadTargetsResponse = response.json().await.map_err(remote_err)?;
        Ok(targets.targets)
    }

    async fn get_bytes(&self, target: &str) -> Result<Vec<u8>, SyncError> {
        let response = self.http.get(target).send().await.map_err(remote_err)?;
        let response = self.expect_success(response, "Download bytes").await?;
        let bytes = response.bytes().await.map_err(remote_err)?;
        Ok(bytes.to_vec())
    }

    async fn update_metadata(&self, uuid: Uuid, patch: &MetadataPatch) -> Result<(), SyncError> {
        let response = self
            .authed(
                self.http
                    .patch(self.api_url(&format!("images/{}/metadata", uuid))),
            )
            .json(patch)
            .send()
            .await
            .map_err(remote_err)?;
        self.expect_success(response, "Update metadata").await?;
        Ok(())
    }

    async fn update_extended_batch(
        &self,
        entries: &[(Uuid, ExtendedMetadata)],
    ) -> Result<(), SyncError> {
        let body = ExtendedBatchBody {
            entries: entries
                .iter()
                .map(|(uuid, extended)| ExtendedEntry {
                    uuid: *uuid,
                    extended,
                })
                .collect(),
        };
        let response = self
            .authed(self.http.post(self.api_url("images/extended-metadata")))
            .json(&body)
            .send()
            .await
            .map_err(remote_err)?;
        self.expect_success(response, "Batch extended-metadata update")
            .await?;
        Ok(())
    }

    async fn tombstone_many(&self, uuids: &[Uuid]) -> Result<TombstoneOutcome, SyncError> {
        let response = self
            .authed(self.http.post(self.api_url("images/tombstones")))
            .json(&UuidsBody { uuids })
            .send()
            .await
            .map_err(remote_err)?;
        let response = self.expect_success(response, "Tombstone records").await?;
        let outcome: TombstoneOutcome = response.json().await.map_err(remote_err)?;
        Ok(outcome)
    }

    async fn get_current_sequence(&self) -> Result<RemoteCursor, SyncError> {
        let response = self
            .authed(self.http.get(self.api_url("sync/sequence")))
            .send()
            .await
            .map_err(remote_err)?;
        let response = self.expect_success(response, "Query sequence").await?;
        let cursor: RemoteCursor = response.json().await.map_err(remote_err)?;
        Ok(cursor)
    }

    async fn acquire_lock(&self) -> Result<LockToken, SyncError> {
        let response = self
            .authed(self.http.post(self.api_url("sync/lock")))
            .send()
            .await
            .map_err(remote_err)?;
        let response = self.expect_success(response, "Acquire sync lock").await?;
        let lock: LockResponse = response.json().await.map_err(remote_err)?;
        log::debug!("Acquired sync lock {}", lock.token);
        Ok(LockToken { token: lock.token })
    }

    async fn release_lock(&self, token: &LockToken) -> Result<RemoteCursor, SyncError> {
        let response = self
            .authed(
                self.http
                    .delete(self.api_url(&format!("sync/lock/{}", token.token))),
            )
            .send()
            .await
            .map_err(remote_err)?;
        let response = self.expect_success(response, "Release sync lock").await?;
        let cursor: RemoteCursor = response.json().await.map_err(remote_err)?;
        log::debug!(
            "Released sync lock {}, new sequence {}",
            token.token,
            cursor.sequence
        );
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            server_url: "https://cloud.example.org/".to_string(),
            username: "alice".to_string(),
            app_password: "pw".to_string(),
            remote_path: "/photovault/".to_string(),
            device_id: None,
        }
    }

    #[test]
    fn test_api_url_normalizes_slashes() {
        let remote = HttpRemoteCollection::new(config()).unwrap();
        assert_eq!(
            remote.api_url("images"),
            "https://cloud.example.org/api/v1/collections/photovault/images"
        );
        assert_eq!(
            remote.api_url("/sync/lock"),
            "https://cloud.example.org/api/v1/collections/photovault/sync/lock"
        );
    }

    #[test]
    fn test_locked_and_conflict_statuses_map_to_contention() {
        let locked = map_error_status(StatusCode::LOCKED, "Acquire sync lock", "");
        assert!(matches!(locked, SyncError::LockContention(_)));

        let conflict = map_error_status(StatusCode::CONFLICT, "Acquire sync lock", "");
        assert!(matches!(conflict, SyncError::LockContention(_)));

        let server = map_error_status(StatusCode::INTERNAL_SERVER_ERROR, "List images", "boom");
        assert!(matches!(server, SyncError::Remote(_)));
    }
}
