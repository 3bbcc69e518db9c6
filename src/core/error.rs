use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TenderError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A compare-and-swap write matched no row because another writer got there first.
    #[error("Stale write: {0}")]
    StaleWrite(String),
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Stable, machine-checkable failure class carried by every [`TenderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    PreconditionFailed,
    Conflict,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
        }
    }

    /// Process exit code used by the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Validation => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Forbidden => 4,
            ErrorKind::PreconditionFailed => 5,
            ErrorKind::Conflict => 6,
            ErrorKind::Storage => 10,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TenderError::ValidationError(_) => ErrorKind::Validation,
            TenderError::NotFound(_) => ErrorKind::NotFound,
            TenderError::Forbidden(_) => ErrorKind::Forbidden,
            TenderError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            TenderError::Conflict(_) => ErrorKind::Conflict,
            TenderError::RusqliteError(_)
            | TenderError::IoError(_)
            | TenderError::StaleWrite(_)
            | TenderError::StorageError(_) => ErrorKind::Storage,
        }
    }

    /// Human-readable reason without the kind prefix.
    pub fn reason(&self) -> String {
        match self {
            TenderError::RusqliteError(e) => e.to_string(),
            TenderError::IoError(e) => e.to_string(),
            TenderError::ValidationError(m)
            | TenderError::NotFound(m)
            | TenderError::Forbidden(m)
            | TenderError::PreconditionFailed(m)
            | TenderError::Conflict(m)
            | TenderError::StaleWrite(m)
            | TenderError::StorageError(m) => m.clone(),
        }
    }

    /// True when SQLite reported the database busy or locked.
    pub fn is_busy(&self) -> bool {
        match self {
            TenderError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// True for a UNIQUE / constraint violation reported by SQLite.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            TenderError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => {
                code.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
