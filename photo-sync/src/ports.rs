//! Port traits the sync core is driven through.
//!
//! The orchestrator never talks to SQLite, HTTP or the filesystem directly;
//! it composes these three ports. Every implementation translates its own
//! representation into the canonical [`ImageRecord`] at the boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{ExtendedMetadata, ImageRecord, MetadataPatch, SyncMetadata};

/// Server-side convergence position: monotonic sequence number plus the
/// opaque session identifier issued on the last lock release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCursor {
    pub sequence: i64,
    pub session_id: String,
}

/// Opaque mutual-exclusion token held for the duration of one sync session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    pub token: Uuid,
}

/// Pre-signed write targets for one record: full image plus thumbnail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTargets {
    pub uuid: Uuid,
    pub image_target: String,
    pub thumbnail_target: String,
}

/// Pre-signed read target for one record's image bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTarget {
    pub uuid: Uuid,
    pub target: String,
}

/// Result of a batched remote tombstone call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TombstoneOutcome {
    pub success_count: usize,
    pub fail_count: usize,
    pub errors: Vec<String>,
}

/// The local persisted collection of image records plus the sync-metadata row
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_all_with_metadata(&self) -> Result<Vec<ImageRecord>, SyncError>;

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Option<ImageRecord>, SyncError>;

    /// Insert a record as given, preserving its timestamps. Used when a
    /// pulled remote record is applied locally.
    async fn insert(&self, record: &ImageRecord) -> Result<(), SyncError>;

    async fn insert_many(&self, records: &[ImageRecord]) -> Result<(), SyncError>;

    async fn update(&self, uuid: Uuid, patch: &MetadataPatch) -> Result<(), SyncError>;

    /// Tombstone a record, stamping `deleted_at`/`updated_at` to now.
    /// Tombstoning an already-tombstoned record is a no-op.
    async fn tombstone(&self, uuid: Uuid) -> Result<(), SyncError>;

    async fn tombstone_many(&self, uuids: &[Uuid]) -> Result<(), SyncError>;

    async fn get_sync_metadata(&self) -> Result<SyncMetadata, SyncError>;

    async fn set_sync_metadata(&self, meta: &SyncMetadata) -> Result<(), SyncError>;
}

/// The remote image collection, including the sequence/lock protocol
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    async fn list_all_with_metadata(&self) -> Result<Vec<ImageRecord>, SyncError>;

    /// Register record metadata and receive pre-signed write targets,
    /// one pair per record, in request order.
    async fn request_upload_targets(
        &self,
        records: &[ImageRecord],
    ) -> Result<Vec<UploadTargets>, SyncError>;

    async fn put_bytes(&self, target: &str, bytes: Vec<u8>) -> Result<(), SyncError>;

    async fn request_download_targets(
        &self,
        uuids: &[Uuid],
    ) -> Result<Vec<DownloadTarget>, SyncError>;

    async fn get_bytes(&self, target: &str) -> Result<Vec<u8>, SyncError>;

    async fn update_metadata(&self, uuid: Uuid, patch: &MetadataPatch) -> Result<(), SyncError>;

    /// Batched extended-metadata update; core fields go through
    /// [`RemoteCollection::update_metadata`] per record.
    async fn update_extended_batch(
        &self,
        entries: &[(Uuid, ExtendedMetadata)],
    ) -> Result<(), SyncError>;

    async fn tombstone_many(&self, uuids: &[Uuid]) -> Result<TombstoneOutcome, SyncError>;

    async fn get_current_sequence(&self) -> Result<RemoteCursor, SyncError>;

    /// Acquire the server-side sync lock. Fails with
    /// [`SyncError::LockContention`] while another client holds it.
    async fn acquire_lock(&self) -> Result<LockToken, SyncError>;

    /// Release the lock. The new authoritative sequence/session identifiers
    /// are defined only by this call, since the lock holder advances them.
    async fn release_lock(&self, token: &LockToken) -> Result<RemoteCursor, SyncError>;
}

/// Local byte storage for image files and their thumbnails
#[async_trait]
pub trait ByteStore: Send + Sync {
    async fn read_image(&self, uuid: Uuid, pixel_format: &str) -> Result<Vec<u8>, SyncError>;

    async fn write_image(
        &self,
        uuid: Uuid,
        pixel_format: &str,
        bytes: &[u8],
    ) -> Result<(), SyncError>;

    /// Remove the image file and any thumbnails for this record
    async fn delete_image(&self, uuid: Uuid, pixel_format: &str) -> Result<(), SyncError>;

    /// Produce thumbnail bytes (WebP) from raw image bytes
    async fn generate_thumbnail(&self, bytes: &[u8]) -> Result<Vec<u8>, SyncError>;

    /// Derive and persist the local thumbnail set from raw image bytes
    async fn write_thumbnails(&self, uuid: Uuid, bytes: &[u8]) -> Result<(), SyncError>;
}
