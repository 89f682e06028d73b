//! Photo ingestion and user-facing deletion.
//!
//! Importing copies the source file into the store under a fresh UUID,
//! computes the content hash and dimensions, derives thumbnails and inserts
//! the record. Deletion only tombstones; files and rows disappear during
//! purge once both sides agree.

use std::path::Path;

use chrono::Utc;
use photo_sync::{ByteStore, ImageRecord, RecordStore};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::photo_store::FilePhotoStore;
use crate::services::record_store::SqliteRecordStore;

/// Encoding tag and MIME type for a decodable image payload
fn identify_format(data: &[u8]) -> Result<(&'static str, &'static str), AppError> {
    match image::guess_format(data) {
        Ok(image::ImageFormat::Jpeg) => Ok(("jpeg", "image/jpeg")),
        Ok(image::ImageFormat::WebP) => Ok(("webp", "image/webp")),
        Ok(other) => Err(AppError::Validation(format!(
            "Unsupported image format: {:?}",
            other
        ))),
        Err(e) => Err(AppError::ImageProcessing(format!(
            "Unrecognized image data: {}",
            e
        ))),
    }
}

/// Import an image file into the local store
pub async fn import_photo(
    records: &SqliteRecordStore,
    photos: &FilePhotoStore,
    source_path: &str,
) -> Result<Uuid, AppError> {
    let data = std::fs::read(source_path)?;
    let (pixel_format, mime_type) = identify_format(&data)?;

    let decoded = image::load_from_memory(&data)
        .map_err(|e| AppError::ImageProcessing(format!("Failed to decode image: {}", e)))?;

    let uuid = Uuid::new_v4();
    let filename = Path::new(source_path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("photo")
        .to_string();

    photos.write_image(uuid, pixel_format, &data).await?;
    photos.write_thumbnails(uuid, &data).await?;

    let now = Utc::now();
    let record = ImageRecord {
        uuid,
        filename,
        byte_size: data.len() as u64,
        pixel_format: pixel_format.to_string(),
        width: decoded.width(),
        height: decoded.height(),
        content_hash: ImageRecord::hash_bytes(&data),
        mime_type: mime_type.to_string(),
        corrupt: false,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        page_count: None,
        page_dimensions: None,
        extended: None,
    };
    records.insert(&record).await?;

    log::info!("Imported photo {} as {}", source_path, uuid);
    Ok(uuid)
}

/// Tombstone a photo; the next sync propagates the deletion
pub async fn delete_photo(records: &SqliteRecordStore, uuid: Uuid) -> Result<(), AppError> {
    if records.get_by_uuid(uuid).await?.is_none() {
        return Err(AppError::NotFound(format!("Photo {}", uuid)));
    }
    records.tombstone(uuid).await?;
    log::info!("Tombstoned photo {}", uuid);
    Ok(())
}

/// Number of photos that are alive locally
pub async fn count_photos(records: &SqliteRecordStore) -> Result<usize, AppError> {
    let all = records.get_all_with_metadata().await?;
    Ok(all.iter().filter(|r| !r.is_tombstoned()).count())
}
