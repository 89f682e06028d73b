//! On-demand and periodic sync triggering.
//!
//! `sync_now` wires the SQLite, HTTP and filesystem adapters into the sync
//! orchestrator and runs one session. The optional background loop calls it
//! at a fixed interval; the UI observes progress through a watch channel
//! and the in-memory session log.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use photo_sync::{ProgressEvent, ProgressSink, SyncError, SyncOrchestrator, SyncOutcome};
use tokio::sync::watch;

use crate::database;
use crate::error::AppError;
use crate::filesystem;
use crate::services::photo_store::FilePhotoStore;
use crate::services::record_store::SqliteRecordStore;
use crate::services::remote_service::{HttpRemoteCollection, RemoteConfig};
use crate::services::sync_service;

const SYNC_INTERVAL_SECONDS: u64 = 300;
const RETRY_DELAY_SECONDS: u64 = 60;

/// Tombstones older than this are physically purged after a successful sync
const TOMBSTONE_RETENTION_DAYS: i64 = 30;

static SYNC_ENABLED: AtomicBool = AtomicBool::new(false);
static SYNC_IN_FLIGHT: AtomicBool = AtomicBool::new(false);
static NEXT_SYNC_AT: AtomicU64 = AtomicU64::new(0); // epoch ms of next planned sync
static SYNC_LOG: OnceLock<Arc<Mutex<Vec<SyncLogEntry>>>> = OnceLock::new();

/// Global progress channel for sync sessions
static SYNC_PROGRESS: OnceLock<watch::Sender<Option<ProgressEvent>>> = OnceLock::new();

/// In-memory session log entry (volatile, lost on app restart)
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub ts_ms: i64,
    pub success: bool,
    pub message: String,
}

fn log_store() -> Arc<Mutex<Vec<SyncLogEntry>>> {
    SYNC_LOG
        .get_or_init(|| Arc::new(Mutex::new(Vec::new())))
        .clone()
}

fn append_log(entry: SyncLogEntry) {
    if let Ok(mut guard) = log_store().lock() {
        guard.push(entry);
        let len = guard.len();
        if len > 500 {
            let remove = len - 500;
            guard.drain(0..remove);
        }
    }
}

pub fn get_sync_log() -> Vec<SyncLogEntry> {
    if let Ok(guard) = log_store().lock() {
        guard.clone()
    } else {
        Vec::new()
    }
}

pub fn next_sync_eta_seconds() -> Option<u64> {
    if !SYNC_ENABLED.load(Ordering::SeqCst) {
        return None;
    }
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_millis() as u64;
    let target = NEXT_SYNC_AT.load(Ordering::SeqCst);
    if target == 0 || target <= now_ms {
        Some(0)
    } else {
        Some((target - now_ms) / 1000)
    }
}

pub fn sync_interval_seconds() -> u64 {
    SYNC_INTERVAL_SECONDS
}

/// Subscribe to sync progress updates
pub fn subscribe_sync_progress() -> watch::Receiver<Option<ProgressEvent>> {
    progress_sender().subscribe()
}

fn progress_sender() -> &'static watch::Sender<Option<ProgressEvent>> {
    SYNC_PROGRESS.get_or_init(|| {
        let (tx, _rx) = watch::channel(None);
        tx
    })
}

/// Starts the background sync loop
///
/// Runs one sync cycle per interval until `stop_background_sync()` is
/// called. Manual `sync_now` calls stay safe alongside it: overlapping
/// sessions are rejected by the in-flight guard.
pub fn start_background_sync() {
    if SYNC_ENABLED.swap(true, Ordering::SeqCst) {
        log::warn!("Background sync already running");
        return;
    }

    log::info!(
        "Starting background sync with {} second interval",
        SYNC_INTERVAL_SECONDS
    );

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime");

        while SYNC_ENABLED.load(Ordering::SeqCst) {
            runtime.block_on(async {
                let delay = match sync_now().await {
                    Ok(outcome) => {
                        log::info!("Background sync finished: {}", outcome.message);
                        SYNC_INTERVAL_SECONDS
                    }
                    Err(e) => {
                        log::error!("Background sync error: {}", e);
                        RETRY_DELAY_SECONDS
                    }
                };

                let now_ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                NEXT_SYNC_AT.store(now_ms + delay * 1000, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(delay)).await;
            });
        }

        log::info!("Background sync stopped");
    });
}

/// Stops the background sync loop
#[allow(dead_code)]
pub fn stop_background_sync() {
    if SYNC_ENABLED.swap(false, Ordering::SeqCst) {
        log::info!("Stopping background sync");
    }
}

/// Checks if background sync is running
#[allow(dead_code)]
pub fn is_background_sync_running() -> bool {
    SYNC_ENABLED.load(Ordering::SeqCst)
}

/// Runs one full sync session against the configured server
pub async fn sync_now() -> Result<SyncOutcome, AppError> {
    if SYNC_IN_FLIGHT.swap(true, Ordering::SeqCst) {
        return Err(AppError::Sync(SyncError::AlreadyRunning));
    }
    let result = run_sync_cycle().await;
    SYNC_IN_FLIGHT.store(false, Ordering::SeqCst);
    result
}

async fn run_sync_cycle() -> Result<SyncOutcome, AppError> {
    let conn = database::init_database()?;

    let settings = sync_service::load_sync_settings(&conn)?
        .ok_or_else(|| AppError::NotFound("Sync settings".to_string()))?;
    if !settings.enabled {
        return Err(AppError::Validation("Sync is disabled".to_string()));
    }
    let device_id = sync_service::get_device_id(&conn)?;

    let records = Arc::new(SqliteRecordStore::new(conn));
    let mut config = RemoteConfig::from(&settings);
    config.device_id = Some(device_id);
    let remote = Arc::new(HttpRemoteCollection::new(config)?);
    let photos = Arc::new(FilePhotoStore::new(filesystem::get_storage_root()));

    let orchestrator =
        SyncOrchestrator::new(records.clone(), remote, photos.clone());

    let sink: ProgressSink = Box::new(|event: ProgressEvent| {
        log::info!(
            "sync {:.0}%: {} ({}/{}) {}",
            event.percentage,
            event.phase,
            event.current,
            event.total,
            event.message
        );
        let _ = progress_sender().send(Some(event));
    });

    let outcome = orchestrator.sync(sink).await;

    if outcome.success {
        purge_after_sync(&records, &photos).await;

        let conn = database::init_database()?;
        sync_service::update_last_sync(&conn)?;
    }

    append_log(SyncLogEntry {
        ts_ms: Utc::now().timestamp_millis(),
        success: outcome.success,
        message: outcome.message.clone(),
    });

    Ok(outcome)
}

/// Drop rows and files for tombstones past the retention window.
/// Purge problems never fail an otherwise successful sync.
async fn purge_after_sync(records: &SqliteRecordStore, photos: &FilePhotoStore) {
    use photo_sync::ByteStore;

    let retention = chrono::Duration::days(TOMBSTONE_RETENTION_DAYS);
    match records.purge_expired_tombstones(retention).await {
        Ok(expired) => {
            for (uuid, pixel_format) in expired {
                if let Err(e) = photos.delete_image(uuid, &pixel_format).await {
                    log::warn!("Failed to remove files for purged record {}: {}", uuid, e);
                }
            }
        }
        Err(e) => log::warn!("Tombstone purge failed: {}", e),
    }
}
