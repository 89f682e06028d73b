pub mod schema;

use std::path::PathBuf;

use rusqlite::Connection;

use crate::error::AppError;
use crate::filesystem;

/// Path to the database file under the storage root
pub fn get_database_path() -> PathBuf {
    filesystem::get_storage_root().join("photovault.db")
}

/// Open the database, creating directories and schema as needed
pub fn init_database() -> Result<Connection, AppError> {
    let db_path = get_database_path();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(&db_path)?;
    schema::init_schema(&conn)?;

    Ok(conn)
}
