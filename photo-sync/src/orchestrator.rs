//! Sync orchestrator: the stateful coordinator for one reconciliation
//! session between the local and remote photo collections.
//!
//! ## Session flow
//!
//! 1. **Initializing**: compare the stored session identifier against the
//!    remote cursor; short-circuit when already in agreement, otherwise
//!    acquire the server-side lock.
//! 2. **Calculating diff**: fetch both record sets, classify every UUID.
//! 3. **Pull phases** (remote → local), then **push phases** (local →
//!    remote), each in delete / create / update / replace order.
//! 4. **Finalizing**: release the lock, persist the new sequence and
//!    session identifier it returns.
//!
//! Per-record failures inside a phase are logged and skipped; the record
//! stays divergent and is picked up again by the next sync. The lock is
//! released on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::diff::{calculate_diff, StateDiff};
use crate::error::SyncError;
use crate::models::{ImageRecord, MetadataPatch, SyncMetadata};
use crate::ports::{ByteStore, RecordStore, RemoteCollection, RemoteCursor, UploadTargets};
use crate::progress::{ProgressReporter, ProgressSink, SyncPhase};

/// Concurrent photo uploads within the upload phase
const MAX_CONCURRENT_UPLOADS: usize = 3;

/// Final result of one sync attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub new_sequence: Option<i64>,
    pub diff: Option<StateDiff>,
}

impl SyncOutcome {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            new_sequence: None,
            diff: None,
        }
    }
}

/// Counts of applied and skipped actions in one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub downloaded: usize,
    pub uploaded: usize,
    pub updated_local: usize,
    pub updated_remote: usize,
    pub replaced_local: usize,
    pub replaced_remote: usize,
    pub deleted_local: usize,
    pub deleted_remote: usize,
    /// Per-record failures that were logged and skipped
    pub skipped: usize,
}

impl SyncStats {
    pub fn summary(&self) -> String {
        format!(
            "downloaded {}, uploaded {}, updated local {}, updated remote {}, \
             replaced local {}, replaced remote {}, deleted local {}, deleted remote {}, \
             skipped {}",
            self.downloaded,
            self.uploaded,
            self.updated_local,
            self.updated_remote,
            self.replaced_local,
            self.replaced_remote,
            self.deleted_local,
            self.deleted_remote,
            self.skipped,
        )
    }
}

/// Coordinates one sync session at a time against the injected ports.
///
/// A single instance should exist per process; an in-flight guard rejects
/// overlapping calls. Cross-client exclusion is the server lock's job.
pub struct SyncOrchestrator {
    records: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteCollection>,
    bytes: Arc<dyn ByteStore>,
    in_flight: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteCollection>,
        bytes: Arc<dyn ByteStore>,
    ) -> Self {
        Self {
            records,
            remote,
            bytes,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one full sync session, reporting progress to `sink`.
    ///
    /// Returns an outcome rather than an error: failures are part of the
    /// result contract the UI consumes.
    pub async fn sync(&self, sink: ProgressSink) -> SyncOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            log::warn!("Rejected sync request: a session is already in progress");
            return SyncOutcome::failure(SyncError::AlreadyRunning.to_string());
        }

        let mut reporter = ProgressReporter::new(sink);
        let outcome = self.run_session(&mut reporter).await;
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_session(&self, reporter: &mut ProgressReporter) -> SyncOutcome {
        reporter.report(SyncPhase::Initializing, 0, 1, "Checking sync state");

        let meta = match self.records.get_sync_metadata().await {
            Ok(meta) => meta,
            Err(e) => return self.fail(reporter, e),
        };
        let cursor = match self.remote.get_current_sequence().await {
            Ok(cursor) => cursor,
            Err(e) => return self.fail(reporter, e),
        };

        // The session identifier, not the sequence number, decides
        // agreement.
        if meta.last_session_id.as_deref() == Some(cursor.session_id.as_str()) {
            log::info!("Local and remote already in sync (session {})", cursor.session_id);
            reporter.report(SyncPhase::Completed, 0, 0, "Already in sync");
            return SyncOutcome {
                success: true,
                message: "Already in sync".to_string(),
                new_sequence: Some(cursor.sequence),
                diff: None,
            };
        }

        let lock = match self.remote.acquire_lock().await {
            Ok(lock) => lock,
            Err(e) => return self.fail(reporter, e),
        };
        reporter.report(SyncPhase::Initializing, 1, 1, "Sync lock acquired");

        match self.run_locked(reporter).await {
            Ok((diff, stats)) => {
                reporter.report(SyncPhase::Finalizing, 0, 1, "Releasing sync lock");
                let new_cursor = match self.remote.release_lock(&lock).await {
                    Ok(cursor) => cursor,
                    Err(e) => {
                        // Client-side lock state is gone either way; the
                        // server's expiry is the backstop. The session did
                        // not converge, so markers stay untouched.
                        log::error!("Failed to release sync lock: {}", e);
                        return self.fail(reporter, e);
                    }
                };
                if let Err(e) = self.persist_markers(&new_cursor).await {
                    return self.fail(reporter, e);
                }
                reporter.report(SyncPhase::Finalizing, 1, 1, "");
                reporter.report(SyncPhase::Completed, 0, 0, "Sync complete");
                log::info!("Sync complete: {}", stats.summary());
                SyncOutcome {
                    success: true,
                    message: format!("Sync complete: {}", stats.summary()),
                    new_sequence: Some(new_cursor.sequence),
                    diff: Some(diff),
                }
            }
            Err(e) => {
                if let Err(release_err) = self.remote.release_lock(&lock).await {
                    log::warn!(
                        "Failed to release sync lock after error: {}",
                        release_err
                    );
                }
                self.fail(reporter, e)
            }
        }
    }

    fn fail(&self, reporter: &mut ProgressReporter, error: SyncError) -> SyncOutcome {
        log::error!("Sync failed: {}", error);
        reporter.report(SyncPhase::Failed, 0, 0, error.to_string());
        SyncOutcome::failure(error.to_string())
    }

    async fn persist_markers(&self, cursor: &RemoteCursor) -> Result<(), SyncError> {
        self.records
            .set_sync_metadata(&SyncMetadata {
                last_sequence: cursor.sequence,
                last_session_id: Some(cursor.session_id.clone()),
                last_sync: Some(Utc::now()),
            })
            .await
    }

    async fn run_locked(
        &self,
        reporter: &mut ProgressReporter,
    ) -> Result<(StateDiff, SyncStats), SyncError> {
        reporter.report(SyncPhase::CalculatingDiff, 0, 1, "Fetching record sets");
        let local = self.records.get_all_with_metadata().await?;
        let remote = self.remote.list_all_with_metadata().await?;

        let diff = calculate_diff(&local, &remote);
        log::info!("Sync diff: {}", diff.summary());
        reporter.report(SyncPhase::CalculatingDiff, 1, 1, diff.summary());

        // Encoding tags of the current local files, needed when replacing
        // local content stored under a different format than the remote's.
        let local_formats: HashMap<Uuid, String> = local
            .iter()
            .map(|r| (r.uuid, r.pixel_format.clone()))
            .collect();

        let mut stats = SyncStats::default();

        // Pull strictly before push: a client that is itself behind should
        // not re-upload data the remote holds newer versions of.
        self.pull_deleting(&diff, &mut stats, reporter).await?;
        self.pull_downloading(&diff, &mut stats, reporter).await?;
        self.pull_updating(&diff, &mut stats, reporter).await?;
        self.pull_replacing(&diff, &local_formats, &mut stats, reporter)
            .await?;

        self.push_deleting(&diff, &mut stats, reporter).await?;
        self.push_uploading(&diff, &mut stats, reporter).await?;
        self.push_updating(&diff, &mut stats, reporter).await?;
        self.push_replacing(&diff, &mut stats, reporter).await?;

        Ok((diff, stats))
    }

    async fn pull_deleting(
        &self,
        diff: &StateDiff,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> Result<(), SyncError> {
        let total = diff.to_delete_local.len();
        reporter.report(SyncPhase::PullDeleting, 0, total, "Applying remote deletions");

        for (i, uuid) in diff.to_delete_local.iter().enumerate() {
            match self.records.tombstone(*uuid).await {
                Ok(()) => stats.deleted_local += 1,
                Err(e) => {
                    log::warn!("Skipping local tombstone for {}: {}", uuid, e);
                    stats.skipped += 1;
                }
            }
            reporter.report(SyncPhase::PullDeleting, i + 1, total, "");
        }
        Ok(())
    }

    async fn pull_downloading(
        &self,
        diff: &StateDiff,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> Result<(), SyncError> {
        let total = diff.to_download.len();
        reporter.report(SyncPhase::PullDownloading, 0, total, "Downloading new photos");
        if total == 0 {
            return Ok(());
        }

        let uuids: Vec<Uuid> = diff.to_download.iter().map(|r| r.uuid).collect();
        let targets = self.remote.request_download_targets(&uuids).await?;
        let targets_by_uuid: HashMap<Uuid, String> = targets
            .into_iter()
            .map(|t| (t.uuid, t.target))
            .collect();

        for (i, record) in diff.to_download.iter().enumerate() {
            match self.download_one(record, &targets_by_uuid).await {
                Ok(()) => stats.downloaded += 1,
                Err(e) => {
                    log::warn!("Skipping download of {}: {}", record.uuid, e);
                    stats.skipped += 1;
                }
            }
            reporter.report(SyncPhase::PullDownloading, i + 1, total, record.filename.clone());
        }
        Ok(())
    }

    async fn download_one(
        &self,
        record: &ImageRecord,
        targets: &HashMap<Uuid, String>,
    ) -> Result<(), SyncError> {
        let target = targets.get(&record.uuid).ok_or_else(|| {
            SyncError::Remote(format!("No download target issued for {}", record.uuid))
        })?;

        let data = self.remote.get_bytes(target).await?;
        self.bytes
            .write_image(record.uuid, &record.pixel_format, &data)
            .await?;
        // Thumbnails are generated locally from the downloaded original.
        self.bytes.write_thumbnails(record.uuid, &data).await?;
        self.records.insert(record).await?;
        Ok(())
    }

    async fn pull_updating(
        &self,
        diff: &StateDiff,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> Result<(), SyncError> {
        let total = diff.to_update_local.len();
        reporter.report(SyncPhase::PullUpdating, 0, total, "Updating local metadata");

        for (i, record) in diff.to_update_local.iter().enumerate() {
            match self
                .records
                .update(record.uuid, &MetadataPatch::from_record(record))
                .await
            {
                Ok(()) => stats.updated_local += 1,
                Err(e) => {
                    log::warn!("Skipping local metadata update for {}: {}", record.uuid, e);
                    stats.skipped += 1;
                }
            }
            reporter.report(SyncPhase::PullUpdating, i + 1, total, "");
        }
        Ok(())
    }

    async fn pull_replacing(
        &self,
        diff: &StateDiff,
        local_formats: &HashMap<Uuid, String>,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> Result<(), SyncError> {
        let total = diff.to_replace_local.len();
        reporter.report(SyncPhase::PullReplacing, 0, total, "Replacing local photos");
        if total == 0 {
            return Ok(());
        }

        let uuids: Vec<Uuid> = diff.to_replace_local.iter().map(|r| r.uuid).collect();
        let targets = self.remote.request_download_targets(&uuids).await?;
        let targets_by_uuid: HashMap<Uuid, String> = targets
            .into_iter()
            .map(|t| (t.uuid, t.target))
            .collect();

        for (i, record) in diff.to_replace_local.iter().enumerate() {
            let old_format = local_formats
                .get(&record.uuid)
                .cloned()
                .unwrap_or_else(|| record.pixel_format.clone());
            match self
                .replace_one_local(record, &old_format, &targets_by_uuid)
                .await
            {
                Ok(()) => stats.replaced_local += 1,
                Err(e) => {
                    log::warn!("Skipping local replacement of {}: {}", record.uuid, e);
                    stats.skipped += 1;
                }
            }
            reporter.report(SyncPhase::PullReplacing, i + 1, total, record.filename.clone());
        }
        Ok(())
    }

    async fn replace_one_local(
        &self,
        record: &ImageRecord,
        old_format: &str,
        targets: &HashMap<Uuid, String>,
    ) -> Result<(), SyncError> {
        let target = targets.get(&record.uuid).ok_or_else(|| {
            SyncError::Remote(format!("No download target issued for {}", record.uuid))
        })?;

        // The stale file goes first; the incoming bytes may reuse the name
        // under a different format.
        self.bytes.delete_image(record.uuid, old_format).await?;
        let data = self.remote.get_bytes(target).await?;
        self.bytes
            .write_image(record.uuid, &record.pixel_format, &data)
            .await?;
        self.bytes.write_thumbnails(record.uuid, &data).await?;
        self.records
            .update(record.uuid, &MetadataPatch::for_replacement(record))
            .await?;
        Ok(())
    }

    async fn push_deleting(
        &self,
        diff: &StateDiff,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> Result<(), SyncError> {
        let total = diff.to_delete_remote.len();
        reporter.report(SyncPhase::PushDeleting, 0, total, "Propagating local deletions");
        if total == 0 {
            return Ok(());
        }

        let outcome = self.remote.tombstone_many(&diff.to_delete_remote).await?;
        for err in &outcome.errors {
            log::warn!("Remote tombstone failure: {}", err);
        }
        stats.deleted_remote += outcome.success_count;
        stats.skipped += outcome.fail_count;
        reporter.report(SyncPhase::PushDeleting, total, total, "");
        Ok(())
    }

    async fn push_uploading(
        &self,
        diff: &StateDiff,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> Result<(), SyncError> {
        let total = diff.to_upload.len();
        reporter.report(SyncPhase::PushUploading, 0, total, "Uploading new photos");
        if total == 0 {
            return Ok(());
        }

        let targets = self.remote.request_upload_targets(&diff.to_upload).await?;
        let targets_by_uuid: HashMap<Uuid, UploadTargets> =
            targets.into_iter().map(|t| (t.uuid, t)).collect();

        let mut join_set: JoinSet<(Uuid, Result<(), SyncError>)> = JoinSet::new();
        let mut completed = 0usize;

        for record in diff.to_upload.iter().cloned() {
            while join_set.len() >= MAX_CONCURRENT_UPLOADS {
                if let Some(joined) = join_set.join_next().await {
                    completed += 1;
                    Self::tally_upload(joined, stats);
                    reporter.report(SyncPhase::PushUploading, completed, total, "");
                }
            }

            let Some(upload_targets) = targets_by_uuid.get(&record.uuid).cloned() else {
                log::warn!("No upload target issued for {}", record.uuid);
                stats.skipped += 1;
                completed += 1;
                reporter.report(SyncPhase::PushUploading, completed, total, "");
                continue;
            };

            let remote = self.remote.clone();
            let bytes = self.bytes.clone();
            join_set.spawn(async move {
                let uuid = record.uuid;
                (uuid, upload_one(remote, bytes, record, upload_targets).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            completed += 1;
            Self::tally_upload(joined, stats);
            reporter.report(SyncPhase::PushUploading, completed, total, "");
        }
        Ok(())
    }

    fn tally_upload(
        joined: Result<(Uuid, Result<(), SyncError>), tokio::task::JoinError>,
        stats: &mut SyncStats,
    ) {
        match joined {
            Ok((_, Ok(()))) => stats.uploaded += 1,
            Ok((uuid, Err(e))) => {
                log::warn!("Skipping upload of {}: {}", uuid, e);
                stats.skipped += 1;
            }
            Err(e) => {
                log::error!("Upload task panicked: {}", e);
                stats.skipped += 1;
            }
        }
    }

    async fn push_updating(
        &self,
        diff: &StateDiff,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> Result<(), SyncError> {
        let total = diff.to_update_remote.len();
        reporter.report(SyncPhase::PushUpdating, 0, total, "Updating remote metadata");
        if total == 0 {
            return Ok(());
        }

        // Extended metadata goes in one batch; core fields per record.
        let extended: Vec<_> = diff
            .to_update_remote
            .iter()
            .filter_map(|r| r.extended.clone().map(|e| (r.uuid, e)))
            .collect();
        if !extended.is_empty() {
            if let Err(e) = self.remote.update_extended_batch(&extended).await {
                log::warn!("Batch extended-metadata update failed: {}", e);
            }
        }

        for (i, record) in diff.to_update_remote.iter().enumerate() {
            match self
                .remote
                .update_metadata(record.uuid, &MetadataPatch::from_record(record))
                .await
            {
                Ok(()) => stats.updated_remote += 1,
                Err(e) => {
                    log::warn!("Skipping remote metadata update for {}: {}", record.uuid, e);
                    stats.skipped += 1;
                }
            }
            reporter.report(SyncPhase::PushUpdating, i + 1, total, "");
        }
        Ok(())
    }

    async fn push_replacing(
        &self,
        diff: &StateDiff,
        stats: &mut SyncStats,
        reporter: &mut ProgressReporter,
    ) -> Result<(), SyncError> {
        let total = diff.to_replace_remote.len();
        reporter.report(SyncPhase::PushReplacing, 0, total, "Replacing remote photos");
        if total == 0 {
            return Ok(());
        }

        let targets = self
            .remote
            .request_upload_targets(&diff.to_replace_remote)
            .await?;
        let targets_by_uuid: HashMap<Uuid, UploadTargets> =
            targets.into_iter().map(|t| (t.uuid, t)).collect();

        for (i, record) in diff.to_replace_remote.iter().enumerate() {
            match self.replace_one_remote(record, &targets_by_uuid).await {
                Ok(()) => stats.replaced_remote += 1,
                Err(e) => {
                    log::warn!("Skipping remote replacement of {}: {}", record.uuid, e);
                    stats.skipped += 1;
                }
            }
            reporter.report(SyncPhase::PushReplacing, i + 1, total, record.filename.clone());
        }
        Ok(())
    }

    async fn replace_one_remote(
        &self,
        record: &ImageRecord,
        targets: &HashMap<Uuid, UploadTargets>,
    ) -> Result<(), SyncError> {
        let upload_targets = targets.get(&record.uuid).ok_or_else(|| {
            SyncError::Remote(format!("No upload target issued for {}", record.uuid))
        })?;

        let data = self
            .bytes
            .read_image(record.uuid, &record.pixel_format)
            .await?;
        let thumbnail = self.bytes.generate_thumbnail(&data).await?;
        // Thumbnail first, then the full image.
        self.remote
            .put_bytes(&upload_targets.thumbnail_target, thumbnail)
            .await?;
        self.remote
            .put_bytes(&upload_targets.image_target, data)
            .await?;
        self.remote
            .update_metadata(record.uuid, &MetadataPatch::for_replacement(record))
            .await?;
        Ok(())
    }
}

async fn upload_one(
    remote: Arc<dyn RemoteCollection>,
    bytes: Arc<dyn ByteStore>,
    record: ImageRecord,
    targets: UploadTargets,
) -> Result<(), SyncError> {
    let data = bytes.read_image(record.uuid, &record.pixel_format).await?;
    let thumbnail = bytes.generate_thumbnail(&data).await?;
    // Thumbnail first, then the full image.
    remote.put_bytes(&targets.thumbnail_target, thumbnail).await?;
    remote.put_bytes(&targets.image_target, data).await?;
    Ok(())
}
