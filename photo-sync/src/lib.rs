//! Offline-first bidirectional photo synchronization.
//!
//! This crate is the sync core of the photovault application: it reconciles
//! a local image collection against a remote one when they have diverged,
//! using per-record timestamps and content hashes, under a server-side
//! mutual-exclusion lock, with weighted multi-phase progress reporting.
//!
//! The core is I/O-free by construction: all storage and network access
//! goes through the [`ports`] traits, which the application implements over
//! SQLite, HTTP and the local filesystem.

pub mod diff;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod ports;
pub mod progress;

pub use diff::{calculate_diff, classify, RecordAction, StateDiff};
pub use error::SyncError;
pub use models::{ExtendedMetadata, ImageRecord, MetadataPatch, PageDimensions, SyncMetadata};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncStats};
pub use ports::{
    ByteStore, DownloadTarget, LockToken, RecordStore, RemoteCollection, RemoteCursor,
    TombstoneOutcome, UploadTargets,
};
pub use progress::{ProgressEvent, ProgressReporter, ProgressSink, SyncPhase};
