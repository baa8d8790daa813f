//! Safe wrapper around a `SQLite` database connection.
//!
//! This file contains **no `unsafe` code**. All FFI interaction is delegated to
//! [`ffi::RawDb`] which encapsulates the raw pointers and C type conversions.

use std::path::Path;
use std::time::Duration;

use super::error::{DbError, DbResult};
use super::ffi::{self, RawDb};
use super::statement::{Statement, StepResult};
use super::value::Value;

/// Path understood by the engine as a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// A `SQLite` database connection.
///
/// Closed when dropped. `Send` but not `Sync`: the owner (a pool slot) hands
/// it to one thread at a time.
pub struct Connection {
    db: RawDb,
    read_only: bool,
}

impl Connection {
    /// Opens (or creates, unless `read_only`) a database at `path`.
    pub fn open(path: &Path, read_only: bool) -> DbResult<Self> {
        let path_str = path.to_string_lossy();
        let flags = if read_only {
            ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_FULLMUTEX
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_FULLMUTEX
        };
        let db = RawDb::open(&path_str, flags)?;
        Ok(Self { db, read_only })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(Path::new(IN_MEMORY_PATH), false)
    }

    /// Whether the handle was opened read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Executes one or more SQL statements separated by semicolons.
    ///
    /// No result rows are returned. Suitable for DDL, PRAGMAs, and
    /// multi-statement scripts.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.db.exec(sql)
    }

    /// Like [`execute_batch`](Self::execute_batch) but zeroizes the internal
    /// C string buffer after execution. Use for SQL containing key material.
    pub fn execute_batch_zeroized(&self, sql: &str) -> DbResult<()> {
        self.db.exec_zeroized(sql)
    }

    /// Prepares a single SQL statement.
    pub fn prepare(&self, sql: &str) -> DbResult<Statement> {
        let raw_stmt = self.db.prepare(sql)?;
        Ok(Statement::new(raw_stmt))
    }

    /// Prepares and executes a single SQL statement with the given parameters.
    ///
    /// Returns the number of rows changed.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        stmt.step()?;
        Ok(self.changes())
    }

    /// Prepares and executes a statement, mapping exactly one result row.
    ///
    /// Returns an error if no row is returned.
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Statement) -> DbResult<T>,
    ) -> DbResult<T> {
        self.query_row_optional(sql, params, mapper)?
            .ok_or_else(|| DbError::new(ffi::SQLITE_DONE, "query returned no rows"))
    }

    /// Like [`query_row`](Self::query_row) but returns `Ok(None)` when no row
    /// is returned.
    pub fn query_row_optional<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Statement) -> DbResult<T>,
    ) -> DbResult<Option<T>> {
        let stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        match stmt.step()? {
            StepResult::Row => mapper(&stmt).map(Some),
            StepResult::Done => Ok(None),
        }
    }

    /// Prepares a statement and collects all matching rows.
    pub fn query_map<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl Fn(&Statement) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        let stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        let mut rows = Vec::new();
        while stmt.step()? == StepResult::Row {
            rows.push(mapper(&stmt)?);
        }
        Ok(rows)
    }

    /// Returns the rowid of the most recent successful INSERT.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.db.last_insert_rowid()
    }

    /// Returns the number of rows changed by the most recent statement.
    #[must_use]
    pub fn changes(&self) -> usize {
        usize::try_from(self.db.changes()).unwrap_or(0)
    }

    /// Installs the engine's busy handler with the given timeout.
    pub fn busy_timeout(&self, timeout: Duration) -> DbResult<()> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.db.busy_timeout(millis)
    }

    /// `false` while an explicit transaction is open on this handle.
    #[must_use]
    pub fn is_autocommit(&self) -> bool {
        self.db.is_autocommit()
    }

    /// Copies this database's `main` schema into `dest` using the online
    /// backup API.
    pub fn backup_to(&self, dest: &Self) -> DbResult<()> {
        self.db.backup_to(&dest.db)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}
