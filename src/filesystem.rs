//! Local storage layout
//!
//! Directory structure:
//! ```text
//! <storage root>/
//! ├── photovault.db
//! ├── photos/
//! │   └── <uuid>.<ext>
//! └── thumbnails/
//!     ├── <uuid>_small.webp
//!     └── <uuid>_medium.webp
//! ```

use std::path::PathBuf;

use uuid::Uuid;

/// Photos directory under the storage root
pub const PHOTOS_DIR: &str = "photos";

/// Thumbnails directory under the storage root
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Resolve the storage root (overridable via PHOTOVAULT_DATA)
pub fn get_storage_root() -> PathBuf {
    match std::env::var("PHOTOVAULT_DATA") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("./data"),
    }
}

/// File extension for an encoding tag ("jpeg" -> "jpg")
pub fn extension_for(pixel_format: &str) -> &str {
    match pixel_format {
        "jpeg" => "jpg",
        other => other,
    }
}

/// File name of the original image for a record
pub fn photo_file_name(uuid: Uuid, pixel_format: &str) -> String {
    format!("{}.{}", uuid, extension_for(pixel_format))
}

/// File name of the small thumbnail for a record
pub fn thumbnail_small_name(uuid: Uuid) -> String {
    format!("{}_small.webp", uuid)
}

/// File name of the medium thumbnail for a record
pub fn thumbnail_medium_name(uuid: Uuid) -> String {
    format!("{}_medium.webp", uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid() -> Uuid {
        Uuid::parse_str("9f2c1a30-0000-0000-0000-000000000001").unwrap()
    }

    #[test]
    fn test_photo_file_name() {
        assert_eq!(
            photo_file_name(uuid(), "jpeg"),
            "9f2c1a30-0000-0000-0000-000000000001.jpg"
        );
        assert_eq!(
            photo_file_name(uuid(), "webp"),
            "9f2c1a30-0000-0000-0000-000000000001.webp"
        );
    }

    #[test]
    fn test_thumbnail_names() {
        assert_eq!(
            thumbnail_small_name(uuid()),
            "9f2c1a30-0000-0000-0000-000000000001_small.webp"
        );
        assert_eq!(
            thumbnail_medium_name(uuid()),
            "9f2c1a30-0000-0000-0000-000000000001_medium.webp"
        );
    }
}
