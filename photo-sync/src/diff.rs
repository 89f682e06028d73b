//! State diffing between the local and remote image collections.
//!
//! [`calculate_diff`] is pure: it classifies every UUID present on either
//! side into exactly one action bucket (or `Unchanged`), using per-record
//! timestamps for direction, content hashes for byte-vs-metadata changes,
//! and tombstones for deletion propagation. Ties are resolved in favour of
//! the remote side as the source of truth.

use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use crate::models::ImageRecord;

/// The eight-bucket classification of per-UUID required actions.
///
/// Records never appear in more than one list. Remote-bound lists carry
/// local records, local-bound lists carry remote records; delete lists
/// carry only the UUID to tombstone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDiff {
    /// New local records (or local resurrections) to create remotely
    pub to_upload: Vec<ImageRecord>,
    /// Records whose local bytes must replace the remote bytes
    pub to_replace_remote: Vec<ImageRecord>,
    /// Records whose local metadata must be written to the remote
    pub to_update_remote: Vec<ImageRecord>,
    /// Local tombstones to propagate to the remote
    pub to_delete_remote: Vec<Uuid>,
    /// New remote records (or remote resurrections) to create locally
    pub to_download: Vec<ImageRecord>,
    /// Records whose remote bytes must replace the local bytes
    pub to_replace_local: Vec<ImageRecord>,
    /// Records whose remote metadata must be written locally
    pub to_update_local: Vec<ImageRecord>,
    /// Remote tombstones to apply locally
    pub to_delete_local: Vec<Uuid>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.total_actions() == 0
    }

    pub fn total_actions(&self) -> usize {
        self.to_upload.len()
            + self.to_replace_remote.len()
            + self.to_update_remote.len()
            + self.to_delete_remote.len()
            + self.to_download.len()
            + self.to_replace_local.len()
            + self.to_update_local.len()
            + self.to_delete_local.len()
    }

    /// Human-readable per-bucket counts for logs and result summaries
    pub fn summary(&self) -> String {
        format!(
            "upload {}, replace remote {}, update remote {}, delete remote {}, \
             download {}, replace local {}, update local {}, delete local {}",
            self.to_upload.len(),
            self.to_replace_remote.len(),
            self.to_update_remote.len(),
            self.to_delete_remote.len(),
            self.to_download.len(),
            self.to_replace_local.len(),
            self.to_update_local.len(),
            self.to_delete_local.len(),
        )
    }
}

/// Classification outcome for a single UUID.
///
/// `Unchanged` is a real outcome, not an absence: records that are already
/// consistent (or whose inconsistency must be ignored, like a tombstone the
/// far side never saw) classify here, which keeps the ignore rules
/// observable in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Upload,
    ReplaceRemote,
    UpdateRemote,
    DeleteRemote,
    Download,
    ReplaceLocal,
    UpdateLocal,
    DeleteLocal,
    Unchanged,
}

/// Classify one UUID given its local and remote record, if present
pub fn classify(local: Option<&ImageRecord>, remote: Option<&ImageRecord>) -> RecordAction {
    match (local, remote) {
        (None, None) => RecordAction::Unchanged,
        // One-sided: a tombstone the far side never saw carries nothing to
        // propagate; the row just waits for purge.
        (Some(l), None) => {
            if l.is_tombstoned() {
                RecordAction::Unchanged
            } else {
                RecordAction::Upload
            }
        }
        (None, Some(r)) => {
            if r.is_tombstoned() {
                RecordAction::Unchanged
            } else {
                RecordAction::Download
            }
        }
        (Some(l), Some(r)) => {
            if l.is_tombstoned() && r.is_tombstoned() {
                // Both sides agree the record is gone; timestamps are
                // irrelevant, re-propagating would churn forever.
                return RecordAction::Unchanged;
            }
            match l.updated_at.cmp(&r.updated_at) {
                Ordering::Greater => {
                    if l.is_tombstoned() {
                        RecordAction::DeleteRemote
                    } else if r.is_tombstoned() {
                        // Local is provably newer: resurrect the remotely
                        // deleted record.
                        RecordAction::Upload
                    } else if l.content_hash != r.content_hash {
                        RecordAction::ReplaceRemote
                    } else if metadata_differs(l, r) {
                        RecordAction::UpdateRemote
                    } else {
                        RecordAction::Unchanged
                    }
                }
                Ordering::Less => {
                    if r.is_tombstoned() {
                        RecordAction::DeleteLocal
                    } else if l.is_tombstoned() {
                        RecordAction::Download
                    } else if l.content_hash != r.content_hash {
                        RecordAction::ReplaceLocal
                    } else if metadata_differs(l, r) {
                        RecordAction::UpdateLocal
                    } else {
                        RecordAction::Unchanged
                    }
                }
                // Tie-break: remote wins as source of truth.
                Ordering::Equal => {
                    if l.is_tombstoned() {
                        RecordAction::DeleteRemote
                    } else if r.is_tombstoned() {
                        RecordAction::DeleteLocal
                    } else if l.content_hash != r.content_hash {
                        RecordAction::ReplaceLocal
                    } else if metadata_differs(l, r) {
                        RecordAction::UpdateLocal
                    } else {
                        RecordAction::Unchanged
                    }
                }
            }
        }
    }
}

/// Compute the full diff between the local and remote record sets.
///
/// Pure and deterministic: UUIDs are visited in sorted order so repeated
/// runs over unchanged inputs yield identical diffs.
pub fn calculate_diff(local: &[ImageRecord], remote: &[ImageRecord]) -> StateDiff {
    let local_by_uuid: HashMap<Uuid, &ImageRecord> =
        local.iter().map(|r| (r.uuid, r)).collect();
    let remote_by_uuid: HashMap<Uuid, &ImageRecord> =
        remote.iter().map(|r| (r.uuid, r)).collect();

    let mut uuids: Vec<Uuid> = local_by_uuid
        .keys()
        .chain(remote_by_uuid.keys())
        .copied()
        .collect();
    uuids.sort_unstable();
    uuids.dedup();

    let mut diff = StateDiff::default();

    for uuid in uuids {
        let l = local_by_uuid.get(&uuid).copied();
        let r = remote_by_uuid.get(&uuid).copied();

        // Remote-bound buckets only classify with a local record present,
        // local-bound ones with a remote record, so the if-lets always bind.
        match classify(l, r) {
            RecordAction::Upload => {
                if let Some(rec) = l {
                    diff.to_upload.push(rec.clone());
                }
            }
            RecordAction::ReplaceRemote => {
                if let Some(rec) = l {
                    diff.to_replace_remote.push(rec.clone());
                }
            }
            RecordAction::UpdateRemote => {
                if let Some(rec) = l {
                    diff.to_update_remote.push(rec.clone());
                }
            }
            RecordAction::DeleteRemote => diff.to_delete_remote.push(uuid),
            RecordAction::Download => {
                if let Some(rec) = r {
                    diff.to_download.push(rec.clone());
                }
            }
            RecordAction::ReplaceLocal => {
                if let Some(rec) = r {
                    diff.to_replace_local.push(rec.clone());
                }
            }
            RecordAction::UpdateLocal => {
                if let Some(rec) = r {
                    diff.to_update_local.push(rec.clone());
                }
            }
            RecordAction::DeleteLocal => diff.to_delete_local.push(uuid),
            RecordAction::Unchanged => {}
        }
    }

    diff
}

/// Whether two records differ in any synchronized metadata field.
///
/// The content hash is deliberately excluded: hash differences mean a byte
/// re-transfer (replace), never a metadata update. Extended metadata is
/// compared through its canonical JSON value, so representation details can
/// not produce spurious updates.
pub fn metadata_differs(a: &ImageRecord, b: &ImageRecord) -> bool {
    a.filename != b.filename
        || a.byte_size != b.byte_size
        || a.width != b.width
        || a.height != b.height
        || a.corrupt != b.corrupt
        || a.mime_type != b.mime_type
        || a.page_count != b.page_count
        || a.page_dimensions != b.page_dimensions
        || canonical_extended(a) != canonical_extended(b)
}

fn canonical_extended(record: &ImageRecord) -> Option<serde_json::Value> {
    record
        .extended
        .as_ref()
        .and_then(|e| serde_json::to_value(e).ok())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    pub(crate) fn record(uuid: &str) -> ImageRecord {
        ImageRecord {
            uuid: Uuid::parse_str(uuid).unwrap(),
            filename: "photo.jpg".to_string(),
            byte_size: 2048,
            pixel_format: "jpeg".to_string(),
            width: 1920,
            height: 1080,
            content_hash: ImageRecord::hash_bytes(b"pixels"),
            mime_type: "image/jpeg".to_string(),
            corrupt: false,
            created_at: ts(1),
            updated_at: ts(1),
            deleted_at: None,
            page_count: None,
            page_dimensions: None,
            extended: None,
        }
    }

    pub(crate) fn ts(n: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap()
    }

    fn tombstoned(mut r: ImageRecord, at: i64) -> ImageRecord {
        r.deleted_at = Some(ts(at));
        r.updated_at = ts(at);
        r
    }

    const X: &str = "11111111-1111-1111-1111-111111111111";
    const Y: &str = "22222222-2222-2222-2222-222222222222";
    const Z: &str = "33333333-3333-3333-3333-333333333333";

    #[test]
    fn test_identical_content_with_newer_local_timestamp_is_unchanged() {
        // Timestamps differ but content and metadata are identical: no
        // action, not even a metadata update.
        let mut local = record(X);
        local.updated_at = ts(2);
        let remote = record(X);

        assert_eq!(classify(Some(&local), Some(&remote)), RecordAction::Unchanged);
        assert!(calculate_diff(&[local], &[remote]).is_empty());
    }

    #[test]
    fn test_local_tombstone_newer_than_remote_propagates_deletion() {
        let local = tombstoned(record(X), 5);
        let mut remote = record(X);
        remote.updated_at = ts(3);

        let diff = calculate_diff(&[local], &[remote]);
        assert_eq!(diff.to_delete_remote, vec![Uuid::parse_str(X).unwrap()]);
        assert_eq!(diff.total_actions(), 1);
    }

    #[test]
    fn test_remote_only_record_is_downloaded() {
        let remote = record(Y);
        let diff = calculate_diff(&[], &[remote.clone()]);
        assert_eq!(diff.to_download, vec![remote]);
    }

    #[test]
    fn test_equal_timestamps_with_differing_hash_favours_remote() {
        let mut local = record(Z);
        local.content_hash = ImageRecord::hash_bytes(b"local edit");
        let remote = record(Z);

        let diff = calculate_diff(&[local], &[remote.clone()]);
        assert_eq!(diff.to_replace_local, vec![remote]);
        assert_eq!(diff.total_actions(), 1);
    }

    #[test]
    fn test_equal_timestamps_metadata_only_favours_remote() {
        let mut local = record(X);
        local.filename = "renamed.jpg".to_string();
        let remote = record(X);

        let diff = calculate_diff(&[local], &[remote.clone()]);
        assert_eq!(diff.to_update_local, vec![remote]);
    }

    #[test]
    fn test_one_sided_tombstones_are_ignored() {
        // A tombstone for a record the far side never saw carries nothing
        // to propagate in either direction.
        let local = tombstoned(record(X), 4);
        let remote = tombstoned(record(Y), 4);

        let diff = calculate_diff(&[local], &[remote]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_local_newer_resurrects_remotely_deleted_record() {
        let mut local = record(X);
        local.updated_at = ts(9);
        let remote = tombstoned(record(X), 5);

        let diff = calculate_diff(&[local.clone()], &[remote]);
        assert_eq!(diff.to_upload, vec![local]);
    }

    #[test]
    fn test_both_tombstoned_is_unchanged_even_with_skewed_timestamps() {
        let local = tombstoned(record(X), 8);
        let remote = tombstoned(record(X), 3);
        assert_eq!(classify(Some(&local), Some(&remote)), RecordAction::Unchanged);
    }

    #[test]
    fn test_tie_break_with_single_tombstone_deletes_the_alive_side() {
        let local_tomb = tombstoned(record(X), 1);
        let remote_alive = record(X);
        let diff = calculate_diff(&[local_tomb], &[remote_alive]);
        assert_eq!(diff.to_delete_remote, vec![Uuid::parse_str(X).unwrap()]);

        let local_alive = record(Y);
        let remote_tomb = tombstoned(record(Y), 1);
        let diff = calculate_diff(&[local_alive], &[remote_tomb]);
        assert_eq!(diff.to_delete_local, vec![Uuid::parse_str(Y).unwrap()]);
    }

    #[test]
    fn test_local_newer_hash_change_replaces_remote() {
        let mut local = record(X);
        local.updated_at = ts(7);
        local.content_hash = ImageRecord::hash_bytes(b"edited");

        let diff = calculate_diff(&[local.clone()], &[record(X)]);
        assert_eq!(diff.to_replace_remote, vec![local]);
    }

    #[test]
    fn test_local_newer_metadata_change_updates_remote() {
        let mut local = record(X);
        local.updated_at = ts(7);
        local.corrupt = true;

        let diff = calculate_diff(&[local.clone()], &[record(X)]);
        assert_eq!(diff.to_update_remote, vec![local]);
    }

    #[test]
    fn test_extended_metadata_deep_equality() {
        let mut local = record(X);
        local.updated_at = ts(7);
        let mut remote = record(X);

        let mut meta = exif("X100");
        local.extended = Some(meta.clone());
        remote.extended = Some(meta.clone());
        assert!(calculate_diff(&[local.clone()], &[remote.clone()]).is_empty());

        meta.description = Some("sunset".to_string());
        local.extended = Some(meta);
        let diff = calculate_diff(&[local.clone()], &[remote]);
        assert_eq!(diff.to_update_remote, vec![local]);
    }

    fn exif(model: &str) -> crate::models::ExtendedMetadata {
        crate::models::ExtendedMetadata {
            camera_model: Some(model.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_partition_completeness() {
        // Every UUID in the union lands in exactly one bucket or none.
        let local = vec![
            record(X),                          // diverged below
            tombstoned(record(Y), 6),           // newer local tombstone
            record(Z),                          // local only
        ];
        let mut diverged = record(X);
        diverged.updated_at = ts(4);
        diverged.content_hash = ImageRecord::hash_bytes(b"remote edit");
        let mut remote_y = record(Y);
        remote_y.updated_at = ts(2);
        let remote = vec![diverged, remote_y];

        let diff = calculate_diff(&local, &remote);

        let mut seen: Vec<Uuid> = Vec::new();
        seen.extend(diff.to_upload.iter().map(|r| r.uuid));
        seen.extend(diff.to_replace_remote.iter().map(|r| r.uuid));
        seen.extend(diff.to_update_remote.iter().map(|r| r.uuid));
        seen.extend(diff.to_delete_remote.iter().copied());
        seen.extend(diff.to_download.iter().map(|r| r.uuid));
        seen.extend(diff.to_replace_local.iter().map(|r| r.uuid));
        seen.extend(diff.to_update_local.iter().map(|r| r.uuid));
        seen.extend(diff.to_delete_local.iter().copied());

        let before = seen.len();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(before, seen.len(), "a UUID appeared in two buckets");

        // X: remote newer with different hash, Y: local tombstone newer,
        // Z: local only.
        assert_eq!(diff.to_replace_local.len(), 1);
        assert_eq!(diff.to_delete_remote, vec![Uuid::parse_str(Y).unwrap()]);
        assert_eq!(diff.to_upload.len(), 1);
    }

    #[test]
    fn test_symmetry() {
        // Swapping the inputs mirrors every direction-labelled bucket,
        // except where the remote-wins tie-break intentionally breaks the
        // mirror, so ties are excluded here.
        let mut newer = record(X);
        newer.updated_at = ts(5);
        newer.content_hash = ImageRecord::hash_bytes(b"changed");
        let older = record(X);
        let only = record(Y);

        let a = calculate_diff(&[newer.clone(), only.clone()], &[older.clone()]);
        let b = calculate_diff(&[older], &[newer, only]);

        assert_eq!(a.to_replace_remote, b.to_replace_local);
        assert_eq!(a.to_upload, b.to_download);
        assert_eq!(a.to_delete_remote, b.to_delete_local);
        assert_eq!(a.to_update_remote, b.to_update_local);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let local = vec![record(Z), record(X), tombstoned(record(Y), 2)];
        let mut remote_x = record(X);
        remote_x.updated_at = ts(3);
        let remote = vec![remote_x];

        let first = calculate_diff(&local, &remote);
        let second = calculate_diff(&local, &remote);
        assert_eq!(first, second);
    }

    #[test]
    fn test_hash_equal_but_size_differs_is_metadata_update() {
        // Hash is excluded from the metadata predicate; a byte_size drift
        // with an equal hash still routes through the metadata bucket.
        let mut local = record(X);
        local.updated_at = ts(2);
        local.byte_size = 4096;

        let diff = calculate_diff(&[local.clone()], &[record(X)]);
        assert_eq!(diff.to_update_remote, vec![local]);
    }
}
