//! Error types and the flat status-code namespace.

use relstore_db::DbError;
use thiserror::Error;

/// Status code for success.
pub const E_OK: i32 = 0;

/// Base offset of every named store error.
pub const E_BASE: i32 = 14_800_000;

/// Result type for store operations.
pub type RdbResult<T> = Result<T, RdbError>;

/// Errors raised by the store, the connection pool and the security manager.
///
/// Every variant maps to one integer through [`RdbError::code`]. Engine
/// failures keep the engine's own result code.
#[derive(Debug, Error)]
pub enum RdbError {
    /// Unspecified failure.
    #[error("rdb error: {0}")]
    Error(String),

    /// An argument was out of range or malformed.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Mutation attempted on a store opened read-only.
    #[error("cannot update a read-only store")]
    CannotUpdateReadOnly,

    /// A file could not be removed.
    #[error("failed to remove file: {0}")]
    RemoveFile(String),

    /// The store is still in use and the operation needs it idle.
    #[error("store is in use")]
    StoreInUsing,

    /// Table name was empty.
    #[error("table name is empty")]
    EmptyTableName,

    /// Values bucket was empty.
    #[error("values bucket is empty")]
    EmptyValuesBucket,

    /// Column index outside the result set.
    #[error("invalid column index {0}")]
    InvalidColumnIndex(usize),

    /// Column value cannot be read as the requested type.
    #[error("invalid column type at index {0}")]
    InvalidColumnType(usize),

    /// File name was empty.
    #[error("file name is empty")]
    EmptyFileName,

    /// Path is malformed, missing, or points at the store itself.
    #[error("invalid file path")]
    InvalidFilePath,

    /// Another thread owns the active transaction, or a transaction
    /// statement was passed through the generic execute path.
    #[error("a transaction is already in execution")]
    TransactionInExecute,

    /// Statement text is not usable for this call.
    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// A write statement reached a read-only connection.
    #[error("write statement executed on a read connection")]
    ExecuteWriteInReadConnection,

    /// Commit or rollback without an active transaction.
    #[error("no transaction in this session")]
    NoTransactionInSession,

    /// Query produced no row where one was required, or a cursor getter was
    /// called while not positioned on a row.
    #[error("no row in query")]
    NoRowInQuery,

    /// Bind argument count does not match the statement placeholders.
    #[error("bind argument count mismatch: expected {expected}, got {actual}")]
    InvalidBindArgsCount {
        /// Placeholders in the compiled statement.
        expected: usize,
        /// Arguments supplied by the caller.
        actual: usize,
    },

    /// Operation not available on a stepped cursor.
    #[error("operation not supported by step result set")]
    NotSupportedByStepResultSet,

    /// Cursor moved past the last row.
    #[error("step result set is after the last row")]
    StepResultIsAfterLast,

    /// Cursor was already closed.
    #[error("result set is closed")]
    StepResultClosed,

    /// `ATTACH` refused because the store runs in WAL mode.
    #[error("attach is not supported in WAL journal mode")]
    NotSupportedAttachInWalMode,

    /// Key or database directory could not be created.
    #[error("failed to create folder: {0}")]
    CreateFolderFail(String),

    /// Write lock cannot be lent while a transaction is open.
    #[error("connection cannot be given temporarily during a transaction")]
    StoreSessionNotGiveConnectionTemporarily,

    /// Capability missing on this build or platform.
    #[error("not supported: {0}")]
    NotSupport(String),

    /// No connection became available within the acquisition timeout.
    #[error("connection limit reached")]
    ConnectionOverLimit,

    /// Commit of a level whose nested transaction failed; the level was
    /// rolled back instead.
    #[error("nested transaction failed, enclosing level rolled back")]
    ChildTransactionFailed,

    /// Key generation, wrapping, or key-file failure.
    #[error("key error: {0}")]
    Key(String),

    /// Error reported by the embedded engine.
    #[error(transparent)]
    Sqlite(#[from] DbError),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RdbError {
    /// Returns the integer status code for this error.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Error(_) | Self::Io(_) => E_BASE,
            Self::InvalidArgs(_) => E_BASE + 1,
            Self::CannotUpdateReadOnly => E_BASE + 2,
            Self::RemoveFile(_) => E_BASE + 3,
            Self::StoreInUsing => E_BASE + 4,
            Self::EmptyTableName => E_BASE + 5,
            Self::EmptyValuesBucket => E_BASE + 6,
            Self::InvalidColumnIndex(_) => E_BASE + 8,
            Self::InvalidColumnType(_) => E_BASE + 9,
            Self::EmptyFileName => E_BASE + 10,
            Self::InvalidFilePath => E_BASE + 11,
            Self::TransactionInExecute => E_BASE + 12,
            Self::InvalidStatement(_) => E_BASE + 13,
            Self::ExecuteWriteInReadConnection => E_BASE + 14,
            Self::NoTransactionInSession => E_BASE + 16,
            Self::NoRowInQuery => E_BASE + 18,
            Self::InvalidBindArgsCount { .. } => E_BASE + 19,
            Self::NotSupportedByStepResultSet => E_BASE + 23,
            Self::StepResultIsAfterLast => E_BASE + 26,
            Self::StepResultClosed => E_BASE + 30,
            Self::NotSupportedAttachInWalMode => E_BASE + 36,
            Self::CreateFolderFail(_) => E_BASE + 37,
            Self::StoreSessionNotGiveConnectionTemporarily => E_BASE + 39,
            Self::NotSupport(_) => E_BASE + 41,
            Self::ConnectionOverLimit => E_BASE + 48,
            Self::ChildTransactionFailed => E_BASE + 50,
            Self::Key(_) => E_BASE + 51,
            Self::Sqlite(err) => err.code.0,
        }
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        Self::Error(format!("{what} mutex poisoned"))
    }
}

/// Converts an operation result into its status code (`E_OK` on success).
pub fn status_code<T>(result: &RdbResult<T>) -> i32 {
    match result {
        Ok(_) => E_OK,
        Err(err) => err.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_codes_are_offsets_from_base() {
        assert_eq!(RdbError::EmptyTableName.code(), 14_800_005);
        assert_eq!(RdbError::TransactionInExecute.code(), 14_800_012);
        assert_eq!(RdbError::NotSupportedAttachInWalMode.code(), 14_800_036);
        assert_eq!(RdbError::ConnectionOverLimit.code(), 14_800_048);
        assert_eq!(
            RdbError::InvalidBindArgsCount {
                expected: 2,
                actual: 1
            }
            .code(),
            14_800_019
        );
    }

    #[test]
    fn test_engine_errors_keep_engine_code() {
        let conn = relstore_db::Connection::open_in_memory().expect("open");
        let err = conn
            .execute_batch("SELECT * FROM missing_table;")
            .expect_err("missing table");
        let rdb: RdbError = err.into();
        assert_eq!(rdb.code(), relstore_db::codes::SQLITE_ERROR);
    }

    #[test]
    fn test_status_code() {
        assert_eq!(status_code(&Ok::<(), RdbError>(())), E_OK);
        assert_eq!(
            status_code::<()>(&Err(RdbError::NoTransactionInSession)),
            E_BASE + 16
        );
    }
}
