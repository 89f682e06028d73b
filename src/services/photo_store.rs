//! Filesystem implementation of the sync core's `ByteStore` port.
//!
//! Originals live under `photos/`, thumbnails under `thumbnails/` as WebP
//! in two sizes (128px for lists, 512px for detail views). Thumbnails are
//! always derived locally from the original bytes, never transferred from
//! the remote.

use std::io::Cursor;
use std::path::PathBuf;

use async_trait::async_trait;
use image::{imageops::FilterType, ImageFormat};
use photo_sync::{ByteStore, SyncError};
use uuid::Uuid;

use crate::filesystem;

const THUMBNAIL_SMALL_SIZE: u32 = 128;
const THUMBNAIL_MEDIUM_SIZE: u32 = 512;

pub struct FilePhotoStore {
    storage_root: PathBuf,
}

impl FilePhotoStore {
    pub fn new(storage_root: PathBuf) -> Self {
        Self { storage_root }
    }

    fn photo_path(&self, uuid: Uuid, pixel_format: &str) -> PathBuf {
        self.storage_root
            .join(filesystem::PHOTOS_DIR)
            .join(filesystem::photo_file_name(uuid, pixel_format))
    }

    fn thumbnail_small_path(&self, uuid: Uuid) -> PathBuf {
        self.storage_root
            .join(filesystem::THUMBNAILS_DIR)
            .join(filesystem::thumbnail_small_name(uuid))
    }

    fn thumbnail_medium_path(&self, uuid: Uuid) -> PathBuf {
        self.storage_root
            .join(filesystem::THUMBNAILS_DIR)
            .join(filesystem::thumbnail_medium_name(uuid))
    }
}

/// Decode raw bytes and re-encode a WebP thumbnail bounded by `size`
fn make_thumbnail(data: &[u8], size: u32) -> Result<Vec<u8>, SyncError> {
    let img = image::load_from_memory(data)
        .map_err(|e| SyncError::ByteStore(format!("Failed to decode image: {}", e)))?;
    let thumb = img.resize(size, size, FilterType::Lanczos3);

    let mut buffer = Cursor::new(Vec::new());
    thumb
        .write_to(&mut buffer, ImageFormat::WebP)
        .map_err(|e| SyncError::ByteStore(format!("Failed to encode thumbnail: {}", e)))?;
    Ok(buffer.into_inner())
}

fn remove_if_exists(path: &PathBuf) -> Result<(), SyncError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::Io(e)),
    }
}

#[async_trait]
impl ByteStore for FilePhotoStore {
    async fn read_image(&self, uuid: Uuid, pixel_format: &str) -> Result<Vec<u8>, SyncError> {
        let path = self.photo_path(uuid, pixel_format);
        std::fs::read(&path).map_err(|e| {
            SyncError::ByteStore(format!("Failed to read {}: {}", path.display(), e))
        })
    }

    async fn write_image(
        &self,
        uuid: Uuid,
        pixel_format: &str,
        bytes: &[u8],
    ) -> Result<(), SyncError> {
        let path = self.photo_path(uuid, pixel_format);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        log::debug!("Wrote photo {}", path.display());
        Ok(())
    }

    async fn delete_image(&self, uuid: Uuid, pixel_format: &str) -> Result<(), SyncError> {
        remove_if_exists(&self.photo_path(uuid, pixel_format))?;
        remove_if_exists(&self.thumbnail_small_path(uuid))?;
        remove_if_exists(&self.thumbnail_medium_path(uuid))?;
        log::debug!("Removed photo files for {}", uuid);
        Ok(())
    }

    async fn generate_thumbnail(&self, bytes: &[u8]) -> Result<Vec<u8>, SyncError> {
        let data = bytes.to_vec();
        // Decode + resize in a blocking thread, off the async runtime.
        tokio::task::spawn_blocking(move || make_thumbnail(&data, THUMBNAIL_MEDIUM_SIZE))
            .await
            .map_err(|e| SyncError::Other(format!("Thumbnail task failed: {}", e)))?
    }

    async fn write_thumbnails(&self, uuid: Uuid, bytes: &[u8]) -> Result<(), SyncError> {
        let data = bytes.to_vec();
        let (small, medium) = tokio::task::spawn_blocking(move || {
            let small = make_thumbnail(&data, THUMBNAIL_SMALL_SIZE)?;
            let medium = make_thumbnail(&data, THUMBNAIL_MEDIUM_SIZE)?;
            Ok::<_, SyncError>((small, medium))
        })
        .await
        .map_err(|e| SyncError::Other(format!("Thumbnail task failed: {}", e)))??;

        let small_path = self.thumbnail_small_path(uuid);
        if let Some(parent) = small_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&small_path, small)?;
        std::fs::write(self.thumbnail_medium_path(uuid), medium)?;
        log::debug!("Wrote thumbnails for {}", uuid);
        Ok(())
    }
}
