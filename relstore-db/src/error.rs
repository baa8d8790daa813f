//! Database error types for the safe `SQLite` wrapper.

use std::fmt;

use thiserror::Error;

/// Primary result code returned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbErrorCode(pub i32);

impl DbErrorCode {
    /// Strips the extended-code bits (`SQLITE_IOERR_READ` -> `SQLITE_IOERR`).
    #[must_use]
    pub const fn primary(self) -> i32 {
        self.0 & 0xff
    }
}

impl fmt::Display for DbErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned by database operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sqlite error {code}: {message}")]
pub struct DbError {
    /// Engine result code.
    pub code: DbErrorCode,
    /// Human-readable error message (from `sqlite3_errmsg` when available).
    pub message: String,
}

impl DbError {
    /// Creates a new database error.
    pub(crate) fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: DbErrorCode(code),
            message: message.into(),
        }
    }

    /// Whether the engine reported `SQLITE_BUSY` or `SQLITE_LOCKED`.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(
            self.code.primary(),
            libsqlite3_sys::SQLITE_BUSY | libsqlite3_sys::SQLITE_LOCKED
        )
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
