use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn db_connect(db_path: &Path, busy_timeout_secs: u32) -> Result<Connection, error::TenderError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(u64::from(busy_timeout_secs)))
        .map_err(error::TenderError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::TenderError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::TenderError::RusqliteError)?;
    Ok(conn)
}

pub fn tender_db_path(root: &Path) -> PathBuf {
    root.join(schemas::TENDER_DB_NAME)
}
