//! SQLite-backed implementation of the sync core's `RecordStore` port.
//!
//! Translates between the `images`/`sync_state` tables and the canonical
//! [`ImageRecord`] at the boundary. Extended metadata and page dimensions
//! are stored as JSON columns.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use photo_sync::{ImageRecord, MetadataPatch, RecordStore, SyncError, SyncMetadata};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

const RECORD_COLUMNS: &str = "uuid, filename, byte_size, pixel_format, width, height, \
     content_hash, mime_type, corrupt, page_count, page_dimensions, extended, \
     created_at, updated_at, deleted_at";

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Physically remove tombstones older than `retention` once both sides
    /// agree the records are gone. Returns (uuid, pixel_format) pairs so
    /// the caller can remove the files as well.
    pub async fn purge_expired_tombstones(
        &self,
        retention: Duration,
    ) -> Result<Vec<(Uuid, String)>, AppError> {
        let cutoff = Utc::now() - retention;
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(
            "SELECT uuid, pixel_format FROM images
             WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
        )?;
        let expired: Vec<(Uuid, String)> = stmt
            .query_map(params![cutoff], |row| {
                let uuid_str: String = row.get(0)?;
                let uuid = parse_uuid(&uuid_str, 0)?;
                Ok((uuid, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        conn.execute(
            "DELETE FROM images WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
            params![cutoff],
        )?;

        if !expired.is_empty() {
            log::info!("Purged {} expired tombstones", expired.len());
        }
        Ok(expired)
    }
}

fn store_err(e: rusqlite::Error) -> SyncError {
    SyncError::Store(e.to_string())
}

fn parse_uuid(raw: &str, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_col<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(s) => serde_json::from_str(&s).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        }),
    }
}

fn to_json<T: Serialize>(value: &Option<T>) -> Result<Option<String>, SyncError> {
    match value {
        None => Ok(None),
        Some(v) => serde_json::to_string(v)
            .map(Some)
            .map_err(|e| SyncError::Store(format!("JSON encode failed: {}", e))),
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<ImageRecord> {
    let uuid_str: String = row.get(0)?;
    Ok(ImageRecord {
        uuid: parse_uuid(&uuid_str, 0)?,
        filename: row.get(1)?,
        byte_size: row.get(2)?,
        pixel_format: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        content_hash: row.get(6)?,
        mime_type: row.get(7)?,
        corrupt: row.get(8)?,
        page_count: row.get(9)?,
        page_dimensions: json_col(row, 10)?,
        extended: json_col(row, 11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        deleted_at: row.get(14)?,
    })
}

fn insert_record(conn: &Connection, record: &ImageRecord) -> Result<(), SyncError> {
    conn.execute(
        "INSERT OR REPLACE INTO images
         (uuid, filename, byte_size, pixel_format, width, height, content_hash,
          mime_type, corrupt, page_count, page_dimensions, extended,
          created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            record.uuid.to_string(),
            record.filename,
            record.byte_size,
            record.pixel_format,
            record.width,
            record.height,
            record.content_hash,
            record.mime_type,
            record.corrupt,
            record.page_count,
            to_json(&record.page_dimensions)?,
            to_json(&record.extended)?,
            record.created_at,
            record.updated_at,
            record.deleted_at,
        ],
    )
    .map_err(store_err)?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_all_with_metadata(&self) -> Result<Vec<ImageRecord>, SyncError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM images", RECORD_COLUMNS))
            .map_err(store_err)?;
        let records = stmt
            .query_map([], row_to_record)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(records)
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Option<ImageRecord>, SyncError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM images WHERE uuid = ?1",
                RECORD_COLUMNS
            ))
            .map_err(store_err)?;
        let result = stmt.query_row(params![uuid.to_string()], row_to_record);
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(store_err(e)),
        }
    }

    async fn insert(&self, record: &ImageRecord) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        insert_record(&conn, record)
    }

    async fn insert_many(&self, records: &[ImageRecord]) -> Result<(), SyncError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        for record in records {
            insert_record(&tx, record)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    async fn update(&self, uuid: Uuid, patch: &MetadataPatch) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        // A patched record is alive by definition; clearing deleted_at
        // covers metadata updates that follow a resurrection.
        conn.execute(
            "UPDATE images SET
                filename = ?1, byte_size = ?2, pixel_format = ?3, width = ?4,
                height = ?5, corrupt = ?6, mime_type = ?7, page_count = ?8,
                page_dimensions = ?9, extended = ?10, updated_at = ?11,
                content_hash = COALESCE(?12, content_hash), deleted_at = NULL
             WHERE uuid = ?13",
            params![
                patch.filename,
                patch.byte_size,
                patch.pixel_format,
                patch.width,
                patch.height,
                patch.corrupt,
                patch.mime_type,
                patch.page_count,
                to_json(&patch.page_dimensions)?,
                to_json(&patch.extended)?,
                patch.updated_at,
                patch.content_hash,
                uuid.to_string(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn tombstone(&self, uuid: Uuid) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        tombstone_one(&conn, uuid)
    }

    async fn tombstone_many(&self, uuids: &[Uuid]) -> Result<(), SyncError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        for uuid in uuids {
            tombstone_one(&tx, *uuid)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    async fn get_sync_metadata(&self) -> Result<SyncMetadata, SyncError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT last_sequence, last_session_id, last_sync FROM sync_state WHERE id = 1",
            [],
            |row| {
                Ok(SyncMetadata {
                    last_sequence: row.get(0)?,
                    last_session_id: row.get(1)?,
                    last_sync: row.get::<_, Option<DateTime<Utc>>>(2)?,
                })
            },
        )
        .map_err(store_err)
    }

    async fn set_sync_metadata(&self, meta: &SyncMetadata) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sync_state SET last_sequence = ?1, last_session_id = ?2, last_sync = ?3
             WHERE id = 1",
            params![meta.last_sequence, meta.last_session_id, meta.last_sync],
        )
        .map_err(store_err)?;
        Ok(())
    }
}

/// Tombstoning an already-tombstoned record is a no-op, so replayed
/// deletions can not keep bumping `updated_at`.
fn tombstone_one(conn: &Connection, uuid: Uuid) -> Result<(), SyncError> {
    let now = Utc::now();
    conn.execute(
        "UPDATE images SET deleted_at = ?1, updated_at = ?1
         WHERE uuid = ?2 AND deleted_at IS NULL",
        params![now, uuid.to_string()],
    )
    .map_err(store_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::init_schema;
    use photo_sync::{ExtendedMetadata, PageDimensions};

    fn test_store() -> SqliteRecordStore {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        SqliteRecordStore::new(conn)
    }

    fn record(uuid: &str) -> ImageRecord {
        let now = Utc::now();
        ImageRecord {
            uuid: Uuid::parse_str(uuid).unwrap(),
            filename: "photo.jpg".to_string(),
            byte_size: 1024,
            pixel_format: "jpeg".to_string(),
            width: 800,
            height: 600,
            content_hash: ImageRecord::hash_bytes(b"data"),
            mime_type: "image/jpeg".to_string(),
            corrupt: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            page_count: Some(2),
            page_dimensions: Some(vec![
                PageDimensions {
                    width: 800,
                    height: 600,
                },
                PageDimensions {
                    width: 640,
                    height: 480,
                },
            ]),
            extended: Some(ExtendedMetadata {
                camera_model: Some("X100".to_string()),
                iso: Some(400),
                ..Default::default()
            }),
        }
    }

    const U: &str = "aaaaaaaa-0000-0000-0000-000000000001";

    #[tokio::test]
    async fn test_insert_and_read_back_round_trip() {
        let store = test_store();
        let rec = record(U);
        store.insert(&rec).await.unwrap();

        let all = store.get_all_with_metadata().await.unwrap();
        assert_eq!(all.len(), 1);
        let loaded = &all[0];
        assert_eq!(loaded.uuid, rec.uuid);
        assert_eq!(loaded.page_dimensions, rec.page_dimensions);
        assert_eq!(loaded.extended, rec.extended);
        assert_eq!(loaded.content_hash, rec.content_hash);
    }

    #[tokio::test]
    async fn test_get_by_uuid_missing_returns_none() {
        let store = test_store();
        let found = store.get_by_uuid(Uuid::new_v4()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_update_applies_patch_and_preserves_hash_when_absent() {
        let store = test_store();
        let rec = record(U);
        store.insert(&rec).await.unwrap();

        let mut patch = MetadataPatch::from_record(&rec);
        patch.filename = "renamed.jpg".to_string();
        store.update(rec.uuid, &patch).await.unwrap();

        let loaded = store.get_by_uuid(rec.uuid).await.unwrap().unwrap();
        assert_eq!(loaded.filename, "renamed.jpg");
        assert_eq!(loaded.content_hash, rec.content_hash);
    }

    #[tokio::test]
    async fn test_tombstone_is_idempotent() {
        let store = test_store();
        let rec = record(U);
        store.insert(&rec).await.unwrap();

        store.tombstone(rec.uuid).await.unwrap();
        let first = store.get_by_uuid(rec.uuid).await.unwrap().unwrap();
        assert!(first.is_tombstoned());

        store.tombstone(rec.uuid).await.unwrap();
        let second = store.get_by_uuid(rec.uuid).await.unwrap().unwrap();
        assert_eq!(first.updated_at, second.updated_at);
        assert_eq!(first.deleted_at, second.deleted_at);
    }

    #[tokio::test]
    async fn test_insert_many_and_tombstone_many_apply_to_all_rows() {
        let store = test_store();
        let first = record(U);
        let second = record("bbbbbbbb-0000-0000-0000-000000000002");
        store.insert_many(&[first.clone(), second.clone()]).await.unwrap();

        let all = store.get_all_with_metadata().await.unwrap();
        assert_eq!(all.len(), 2);

        store
            .tombstone_many(&[first.uuid, second.uuid])
            .await
            .unwrap();
        let all = store.get_all_with_metadata().await.unwrap();
        assert!(all.iter().all(|r| r.is_tombstoned()));
    }

    #[tokio::test]
    async fn test_sync_metadata_round_trip() {
        let store = test_store();
        let initial = store.get_sync_metadata().await.unwrap();
        assert_eq!(initial.last_sequence, 0);
        assert_eq!(initial.last_session_id, None);

        let meta = SyncMetadata {
            last_sequence: 12,
            last_session_id: Some("session-12".to_string()),
            last_sync: Some(Utc::now()),
        };
        store.set_sync_metadata(&meta).await.unwrap();

        let loaded = store.get_sync_metadata().await.unwrap();
        assert_eq!(loaded.last_sequence, 12);
        assert_eq!(loaded.last_session_id, Some("session-12".to_string()));
        assert!(loaded.last_sync.is_some());
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_tombstones() {
        let store = test_store();
        let mut old = record(U);
        old.deleted_at = Some(Utc::now() - Duration::days(60));
        let fresh = record("bbbbbbbb-0000-0000-0000-000000000002");
        store.insert(&old).await.unwrap();
        store.insert(&fresh).await.unwrap();

        let purged = store
            .purge_expired_tombstones(Duration::days(30))
            .await
            .unwrap();
        assert_eq!(purged, vec![(old.uuid, "jpeg".to_string())]);

        let all = store.get_all_with_metadata().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].uuid, fresh.uuid);
    }
}
