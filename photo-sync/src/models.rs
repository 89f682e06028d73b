use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Pixel dimensions of a single page in a multi-page format (TIFF, scanned PDF)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDimensions {
    pub width: u32,
    pub height: u32,
}

/// EXIF-like extended metadata attached to an image record.
///
/// Free-text fields live in the sorted `extra` map so that deep equality
/// never depends on serialization order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedMetadata {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub exposure_time: Option<String>,
    pub aperture: Option<String>,
    pub iso: Option<u32>,
    pub focal_length_mm: Option<f64>,
    pub taken_at: Option<DateTime<Utc>>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// The unit of synchronization: one image known to a store.
///
/// The UUID is assigned at creation, never changes, and is the sole join
/// key between the local and remote copy of the same logical image.
/// `updated_at` is authoritative for conflict resolution; every user
/// mutation (including tombstoning) must bump it. A set `deleted_at` means
/// the record is a tombstone: logically deleted, but the row persists until
/// both sides agree, so that deletions cannot be resurrected by a stale
/// replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub uuid: Uuid,
    pub filename: String,
    pub byte_size: u64,
    /// Encoding tag, e.g. "jpeg", "webp", "tiff"
    pub pixel_format: String,
    pub width: u32,
    pub height: u32,
    /// SHA-256 of the raw image bytes, lowercase hex
    pub content_hash: String,
    pub mime_type: String,
    pub corrupt: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_dimensions: Option<Vec<PageDimensions>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended: Option<ExtendedMetadata>,
}

impl ImageRecord {
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Content hash of raw image bytes (SHA-256, lowercase hex)
    pub fn hash_bytes(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }
}

/// The field subset carried by metadata-only updates.
///
/// `content_hash` is `None` for pure metadata updates; it is set only when
/// the patch accompanies a content replacement, since hash changes always
/// travel with a byte re-transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub filename: String,
    pub byte_size: u64,
    pub pixel_format: String,
    pub width: u32,
    pub height: u32,
    pub corrupt: bool,
    pub mime_type: String,
    pub page_count: Option<u32>,
    pub page_dimensions: Option<Vec<PageDimensions>>,
    pub extended: Option<ExtendedMetadata>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl MetadataPatch {
    /// Metadata-only patch carrying the source record's fields and timestamp
    pub fn from_record(record: &ImageRecord) -> Self {
        Self {
            filename: record.filename.clone(),
            byte_size: record.byte_size,
            pixel_format: record.pixel_format.clone(),
            width: record.width,
            height: record.height,
            corrupt: record.corrupt,
            mime_type: record.mime_type.clone(),
            page_count: record.page_count,
            page_dimensions: record.page_dimensions.clone(),
            extended: record.extended.clone(),
            updated_at: record.updated_at,
            content_hash: None,
        }
    }

    /// Patch for a content replacement: metadata plus the new hash
    pub fn for_replacement(record: &ImageRecord) -> Self {
        let mut patch = Self::from_record(record);
        patch.content_hash = Some(record.content_hash.clone());
        patch
    }
}

/// Process-local convergence markers, written only after a lock-protected
/// sync session completes.
///
/// `last_session_id` (not the sequence number) decides whether local and
/// remote are already in agreement at the start of a sync attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub last_sequence: i64,
    pub last_session_id: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_stable() {
        let a = ImageRecord::hash_bytes(b"hello");
        let b = ImageRecord::hash_bytes(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, ImageRecord::hash_bytes(b"world"));
    }

    #[test]
    fn test_replacement_patch_carries_hash() {
        let record = crate::diff::tests::record("11111111-1111-1111-1111-111111111111");
        assert_eq!(MetadataPatch::from_record(&record).content_hash, None);
        assert_eq!(
            MetadataPatch::for_replacement(&record).content_hash,
            Some(record.content_hash.clone())
        );
    }
}
