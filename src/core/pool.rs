//! SQLite connection pool with read/write separation and bounded retry.
//!
//! - Maintains a **write mutex** per store so in-process writers queue instead of
//!   spinning on `SQLITE_BUSY`.
//! - Every write closure runs inside a `BEGIN IMMEDIATE` transaction: the database
//!   write lock is taken up front, so a read-check-write sequence inside the closure
//!   is serialized against other processes as well.
//! - Creates fresh **read connections** per operation (no mutex, concurrent via WAL).
//!
//! Connections are NOT pooled (opened fresh each time) to avoid WAL/SHM file handle
//! conflicts when several stores point at the same database file.

use crate::core::db;
use crate::core::error::TenderError;
use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 10;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 1_000;

/// Write connection busy_timeout in seconds.
const WRITE_BUSY_TIMEOUT_SECS: u32 = 5;
/// Read connection busy_timeout in seconds.
const READ_BUSY_TIMEOUT_SECS: u32 = 5;

/// Connection pool for one SQLite database file.
#[derive(Debug)]
pub struct SqlitePool {
    write_lock: Mutex<()>,
    db_path: PathBuf,
}

impl SqlitePool {
    pub fn new(db_path: &Path) -> Self {
        Self {
            write_lock: Mutex::new(()),
            db_path: db_path.to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Execute a closure inside an immediate write transaction.
    /// Commits when the closure returns `Ok`; any `Err` rolls the whole unit back.
    pub fn with_write<F, R>(&self, f: F) -> Result<R, TenderError>
    where
        F: FnOnce(&Connection) -> Result<R, TenderError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| TenderError::StorageError("pool write lock poisoned".to_string()))?;

        let mut conn = db::db_connect(&self.db_path, WRITE_BUSY_TIMEOUT_SECS)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&*tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Execute a closure with a read connection (no mutex serialization).
    /// WAL mode allows concurrent readers across threads and processes.
    pub fn with_read<F, R>(&self, f: F) -> Result<R, TenderError>
    where
        F: FnOnce(&Connection) -> Result<R, TenderError>,
    {
        let conn = db::db_connect(&self.db_path, READ_BUSY_TIMEOUT_SECS)?;
        f(&conn)
    }
}

/// Retry a closure on busy/locked errors and lost compare-and-swap writes,
/// with exponential backoff, up to `max_attempts` calls in total.
///
/// Exhausting the budget surfaces a `StorageError`; every other error is
/// returned on first sight.
pub fn retry_bounded<F, R>(max_attempts: u32, mut f: F) -> Result<R, TenderError>
where
    F: FnMut(u32) -> Result<R, TenderError>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if is_retryable(&e) => {
                if attempt >= max_attempts {
                    return Err(TenderError::StorageError(format!(
                        "gave up after {} attempts: {}",
                        attempt,
                        e.reason()
                    )));
                }
                tracing::warn!(attempt, error = %e, "retrying contended write");
                thread::sleep(Duration::from_millis(backoff_delay_ms(attempt)));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff for the given 1-based attempt, capped at `MAX_DELAY_MS`.
fn backoff_delay_ms(attempt: u32) -> u64 {
    BASE_DELAY_MS
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
        .min(MAX_DELAY_MS)
}

/// Busy/locked SQLite failures and lost compare-and-swap writes are retryable.
fn is_retryable(err: &TenderError) -> bool {
    matches!(err, TenderError::StaleWrite(_)) || err.is_busy()
}
