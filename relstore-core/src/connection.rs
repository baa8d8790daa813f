//! One pooled handle to the store's database file.

use std::path::{Path, PathBuf};

use relstore_db::{cipher, Connection, Statement, StepResult, Value, IN_MEMORY_PATH};
use zeroize::Zeroizing;

use crate::config::RdbStoreConfig;
use crate::error::{RdbError, RdbResult};
use crate::sql_utils::anonymous_path;

/// A database attached under an alias. Re-applied to every connection the
/// pool opens.
#[derive(Clone)]
pub struct Attachment {
    /// Schema alias used in SQL (`alias.table`).
    pub alias: String,
    /// File of the attached database.
    pub path: PathBuf,
    /// Raw key of the attached database, if it is encrypted.
    pub key: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("alias", &self.alias)
            .field("path", &anonymous_path(&self.path))
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Attaches `path` as `alias` on `conn`.
///
/// The keyed form is used whenever a key is present; an empty key attaches
/// a plaintext database to an encrypted one.
pub(crate) fn attach(conn: &Connection, alias: &str, path: &Path, key: Option<&[u8]>) -> RdbResult<()> {
    let path_value = Value::Text(path.to_string_lossy().into_owned());
    let alias_value = Value::Text(alias.to_string());
    match key {
        Some(key) => conn.execute(
            "ATTACH DATABASE ? AS ? KEY ?",
            &[path_value, alias_value, cipher::key_bind_value(key)],
        )?,
        None => conn.execute("ATTACH DATABASE ? AS ?", &[path_value, alias_value])?,
    };
    Ok(())
}

/// A connection owned by the pool: the writer or one of the readers.
///
/// Carries the in-transaction flag used by the transaction coordinator.
/// The flag is plain bookkeeping; the pool serializes access to it by only
/// leasing the connection to one thread at a time.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
    is_write: bool,
    in_transaction: bool,
}

impl SqliteConnection {
    /// Opens a connection for `config`, keys it, configures it, and
    /// re-applies `attachments`.
    ///
    /// Readers and every connection of a read-only store are opened
    /// read-only. Journal mode and page size are only applied by the writer.
    pub fn open(
        config: &RdbStoreConfig,
        is_write: bool,
        key: Option<&[u8]>,
        attachments: &[Attachment],
    ) -> RdbResult<Self> {
        let read_only = config.read_only || !is_write;
        let conn = if config.is_memory() {
            Connection::open(Path::new(IN_MEMORY_PATH), false)?
        } else {
            Connection::open(&config.path, read_only)?
        };
        conn.busy_timeout(config.busy_timeout())?;

        if let Some(key) = key.filter(|k| !k.is_empty()) {
            cipher::apply_key(&conn, key).map_err(|e| {
                log::error!(
                    "keying {} failed: {}",
                    anonymous_path(&config.path),
                    e.code.0
                );
                e
            })?;
        }

        if is_write && !config.read_only {
            cipher::configure_connection(
                &conn,
                &config.journal_mode.to_string(),
                Some(config.page_size),
            )?;
        }

        for attachment in attachments {
            attach(
                &conn,
                &attachment.alias,
                &attachment.path,
                attachment.key.as_ref().map(|k| k.as_slice()),
            )?;
        }

        log::debug!(
            "opened {} connection to {}",
            if is_write { "write" } else { "read" },
            anonymous_path(&config.path)
        );
        Ok(Self {
            conn,
            is_write,
            in_transaction: false,
        })
    }

    /// Whether this is the pool's writer.
    #[must_use]
    pub const fn is_write_connection(&self) -> bool {
        self.is_write
    }

    /// Transaction bookkeeping flag.
    #[must_use]
    pub const fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Sets the transaction bookkeeping flag.
    pub fn set_in_transaction(&mut self, in_transaction: bool) {
        self.in_transaction = in_transaction;
    }

    /// The underlying engine connection.
    #[must_use]
    pub const fn raw(&self) -> &Connection {
        &self.conn
    }

    /// Compiles `sql` and reports whether the engine classifies it as
    /// read-only.
    pub fn prepare(&self, sql: &str) -> RdbResult<(Statement, bool)> {
        let stmt = self.conn.prepare(sql)?;
        let read_only = stmt.is_readonly();
        Ok((stmt, read_only))
    }

    /// Compiles `sql`, checks the argument count, and binds `args`.
    pub fn prepare_bound(&self, sql: &str, args: &[Value]) -> RdbResult<(Statement, bool)> {
        let (stmt, read_only) = self.prepare(sql)?;
        check_bind_args(&stmt, args)?;
        stmt.bind_values(args)?;
        Ok((stmt, read_only))
    }

    fn step_once(&self, sql: &str, args: &[Value]) -> RdbResult<Statement> {
        let (stmt, read_only) = self.prepare_bound(sql, args)?;
        if !read_only && !self.is_write {
            return Err(RdbError::ExecuteWriteInReadConnection);
        }
        stmt.step()?;
        Ok(stmt)
    }

    /// Executes one statement, ignoring any produced rows.
    pub fn execute_sql(&self, sql: &str, args: &[Value]) -> RdbResult<()> {
        self.step_once(sql, args).map(drop)
    }

    /// Executes an `INSERT` and returns the new rowid, or `-1` when no row
    /// was inserted.
    pub fn execute_for_last_inserted_row_id(&self, sql: &str, args: &[Value]) -> RdbResult<i64> {
        self.step_once(sql, args)?;
        if self.conn.changes() == 0 {
            return Ok(-1);
        }
        Ok(self.conn.last_insert_rowid())
    }

    /// Executes an `UPDATE`/`DELETE` and returns the number of changed rows.
    pub fn execute_for_changed_row_count(&self, sql: &str, args: &[Value]) -> RdbResult<usize> {
        self.step_once(sql, args)?;
        Ok(self.conn.changes())
    }

    fn first_column(&self, sql: &str, args: &[Value]) -> RdbResult<Statement> {
        let (stmt, read_only) = self.prepare_bound(sql, args)?;
        if !read_only && !self.is_write {
            return Err(RdbError::ExecuteWriteInReadConnection);
        }
        match stmt.step()? {
            StepResult::Row if stmt.column_count() > 0 => Ok(stmt),
            _ => Err(RdbError::NoRowInQuery),
        }
    }

    /// First column of the first row as an integer.
    pub fn execute_get_long(&self, sql: &str, args: &[Value]) -> RdbResult<i64> {
        Ok(self.first_column(sql, args)?.column_i64(0))
    }

    /// First column of the first row as text.
    pub fn execute_get_string(&self, sql: &str, args: &[Value]) -> RdbResult<String> {
        Ok(self.first_column(sql, args)?.column_text(0))
    }

    /// Runs a query to completion and returns column names plus every row.
    pub fn query_all(&self, sql: &str, args: &[Value]) -> RdbResult<(Vec<String>, Vec<Vec<Value>>)> {
        let (stmt, _) = self.prepare_bound(sql, args)?;
        let names = stmt.column_names();
        let mut rows = Vec::new();
        while stmt.step()? == StepResult::Row {
            rows.push(stmt.row_values());
        }
        Ok((names, rows))
    }
}

/// Fails with [`RdbError::InvalidBindArgsCount`] unless `args` matches the
/// placeholders of `stmt` one for one.
pub(crate) fn check_bind_args(stmt: &Statement, args: &[Value]) -> RdbResult<()> {
    let expected = stmt.bind_parameter_count();
    if expected != args.len() {
        return Err(RdbError::InvalidBindArgsCount {
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}
