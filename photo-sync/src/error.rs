use std::fmt;

/// Error type for sync operations
#[derive(Debug)]
pub enum SyncError {
    /// Another client holds the server-side sync lock. Retryable.
    LockContention(String),
    /// A sync session is already running in this process
    AlreadyRunning,
    /// Remote collection error (network, server)
    Remote(String),
    /// Local record store error
    Store(String),
    /// Local byte storage error
    ByteStore(String),
    /// Filesystem error
    Io(std::io::Error),
    /// General error
    Other(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::LockContention(msg) => write!(f, "Sync lock held by another client: {}", msg),
            SyncError::AlreadyRunning => write!(f, "A sync session is already in progress"),
            SyncError::Remote(msg) => write!(f, "Remote error: {}", msg),
            SyncError::Store(msg) => write!(f, "Record store error: {}", msg),
            SyncError::ByteStore(msg) => write!(f, "Byte storage error: {}", msg),
            SyncError::Io(e) => write!(f, "IO error: {}", e),
            SyncError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e)
    }
}

impl SyncError {
    /// Whether retrying the whole sync later can succeed without user action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::LockContention(_) | SyncError::AlreadyRunning | SyncError::Remote(_)
        )
    }
}
