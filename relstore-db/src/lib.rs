//! Minimal safe `SQLite` wrapper used by `relstore-core`.
//!
//! The engine comes from `libsqlite3-sys`:
//!
//! * `bundled` (default): plain bundled `SQLite`.
//! * `sqlcipher`: bundled SQLCipher, which adds page encryption
//!   (`PRAGMA key` / `PRAGMA rekey`, keyed `ATTACH`, `sqlcipher_export`).
//!
//! Consumer code uses only the safe types defined here. The `ffi` module is
//! the **only** file that contains `unsafe` code or C types.

mod ffi;

mod connection;
pub mod error;
mod statement;
pub mod value;

pub mod cipher;

pub use connection::{Connection, IN_MEMORY_PATH};
pub use error::{DbError, DbErrorCode, DbResult};
pub use statement::{ColumnType, Statement, StepResult};
pub use value::Value;

/// Engine result codes surfaced by [`DbError::code`].
pub mod codes {
    pub use libsqlite3_sys::{
        SQLITE_BUSY, SQLITE_CONSTRAINT, SQLITE_CORRUPT, SQLITE_DONE, SQLITE_ERROR,
        SQLITE_LOCKED, SQLITE_MISUSE, SQLITE_NOTADB, SQLITE_RANGE, SQLITE_READONLY,
    };
}
