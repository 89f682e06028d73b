pub mod background_sync;
pub mod photo_service;
pub mod photo_store;
pub mod record_store;
pub mod remote_service;
pub mod sync_service;
