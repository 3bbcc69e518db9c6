//! Store abstraction for the tender engine's persistent state.
//!
//! A [`Store`] is the entity store adapter handed to the engine: it owns the
//! database location and the connection pool, and exposes closure-based read and
//! write units. There is no process-wide handle; callers open a store, pass it
//! around, and close it explicitly.

use crate::core::db;
use crate::core::error::TenderError;
use crate::core::pool::{self, SqlitePool};
use crate::subsystems;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Store handle representing one tender workspace on disk.
///
/// Cloning is cheap and shares the write serialization of the original handle.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
    pool: Arc<SqlitePool>,
}

impl Store {
    /// Open (creating if needed) the store rooted at `root` and run every schema initializer.
    pub fn open(root: &Path) -> Result<Self, TenderError> {
        fs::create_dir_all(root)?;
        let db_path = db::tender_db_path(root);
        let store = Self {
            root: root.to_path_buf(),
            pool: Arc::new(SqlitePool::new(&db_path)),
        };
        store.with_write("store.init", |conn| subsystems::initialize_all(conn))?;
        tracing::debug!(root = %root.display(), "store opened");
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    /// Run `f` against a fresh read connection.
    pub fn with_read<F, R>(&self, op: &str, f: F) -> Result<R, TenderError>
    where
        F: FnOnce(&Connection) -> Result<R, TenderError>,
    {
        let result = self.pool.with_read(f);
        log_op(op, "read", &result);
        result
    }

    /// Run `f` as one atomic, serialized write unit.
    pub fn with_write<F, R>(&self, op: &str, f: F) -> Result<R, TenderError>
    where
        F: FnOnce(&Connection) -> Result<R, TenderError>,
    {
        let result = self.pool.with_write(f);
        log_op(op, "write", &result);
        result
    }

    /// Like [`Store::with_write`], re-running the whole unit on contention or a lost
    /// compare-and-swap, at most `attempts` times.
    pub fn with_write_retry<F, R>(&self, op: &str, attempts: u32, mut f: F) -> Result<R, TenderError>
    where
        F: FnMut(&Connection) -> Result<R, TenderError>,
    {
        pool::retry_bounded(attempts, |_| self.with_write(op, &mut f))
    }

    /// Fold the WAL back into the main database file and release the handle.
    pub fn close(self) -> Result<(), TenderError> {
        // Drain in-process writers before checkpointing.
        self.with_write("store.close", |_| Ok(()))?;
        self.with_read("store.checkpoint", |conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
            Ok(())
        })?;
        tracing::debug!(root = %self.root.display(), "store closed");
        Ok(())
    }
}

fn log_op<R>(op: &str, mode: &str, result: &Result<R, TenderError>) {
    match result {
        Ok(_) => tracing::debug!(op, mode, status = "success", "store op"),
        Err(e) => tracing::debug!(op, mode, status = "error", error = %e, "store op"),
    }
}
