use relstore_db::{cipher, StepResult, Value};

use super::RdbStore;
use crate::connection::SqliteConnection;
use crate::error::{RdbError, RdbResult};
use crate::predicates::RdbPredicates;
use crate::result_set::{SharedResultSet, StepResultSet};
use crate::sql_builder::{build_count, build_delete, build_insert, build_query, build_update};
use crate::sql_utils::{statement_type, ConflictResolution, StatementType};
use crate::values_bucket::ValuesBucket;

impl RdbStore {
    /// Inserts one row and returns its rowid.
    ///
    /// # Errors
    ///
    /// [`RdbError::EmptyTableName`] / [`RdbError::EmptyValuesBucket`] before
    /// any connection is touched, or the engine error of the insert.
    pub fn insert(&self, table: &str, values: &ValuesBucket) -> RdbResult<i64> {
        self.insert_with_conflict_resolution(table, values, ConflictResolution::None)
    }

    /// Inserts one row, replacing any row it conflicts with.
    pub fn replace(&self, table: &str, values: &ValuesBucket) -> RdbResult<i64> {
        self.insert_with_conflict_resolution(table, values, ConflictResolution::Replace)
    }

    /// Inserts one row with an explicit `OR <conflict>` clause. Returns `-1`
    /// when the row was ignored.
    pub fn insert_with_conflict_resolution(
        &self,
        table: &str,
        values: &ValuesBucket,
        conflict: ConflictResolution,
    ) -> RdbResult<i64> {
        let (sql, args) = build_insert(table, values, conflict)?;
        self.check_writable()?;
        let row_id = self
            .pool
            .acquire_write()?
            .execute_for_last_inserted_row_id(&sql, &args)?;
        self.debouncer.do_cloud_sync(table);
        Ok(row_id)
    }

    /// Inserts every row inside one transaction and returns how many rows
    /// were inserted.
    ///
    /// Nothing is inserted when any row fails. Called inside an open
    /// transaction, the batch becomes a nested level of it.
    ///
    /// # Errors
    ///
    /// Validation errors before any connection is touched; otherwise the
    /// error of the first failing row, after the batch was rolled back.
    pub fn batch_insert(&self, table: &str, rows: &[ValuesBucket]) -> RdbResult<usize> {
        if table.trim().is_empty() {
            return Err(RdbError::EmptyTableName);
        }
        if rows.is_empty() {
            return Ok(0);
        }
        let statements = rows
            .iter()
            .map(|row| build_insert(table, row, ConflictResolution::None))
            .collect::<RdbResult<Vec<_>>>()?;
        self.check_writable()?;

        self.begin_transaction()?;
        let inserted = self.pool.acquire_write().and_then(|lease| {
            for (sql, args) in &statements {
                lease.execute_sql(sql, args)?;
            }
            Ok(statements.len())
        });

        match inserted {
            Ok(count) => {
                self.commit()?;
                self.debouncer.do_cloud_sync(table);
                Ok(count)
            }
            Err(err) => {
                log::error!("batch insert into {table} failed: {err}");
                if let Err(rollback) = self.roll_back() {
                    log::error!("rollback of batch insert failed: {rollback}");
                }
                Err(err)
            }
        }
    }

    /// Updates the rows matched by `predicates` and returns how many
    /// changed.
    pub fn update(&self, values: &ValuesBucket, predicates: &RdbPredicates) -> RdbResult<usize> {
        self.update_with_conflict_resolution(values, predicates, ConflictResolution::None)
    }

    /// Updates with an explicit `OR <conflict>` clause.
    pub fn update_with_conflict_resolution(
        &self,
        values: &ValuesBucket,
        predicates: &RdbPredicates,
        conflict: ConflictResolution,
    ) -> RdbResult<usize> {
        let table = predicates.table_name();
        let (sql, args) = build_update(
            table,
            values,
            predicates.where_clause(),
            predicates.where_args(),
            conflict,
        )?;
        self.check_writable()?;
        let changed = self
            .pool
            .acquire_write()?
            .execute_for_changed_row_count(&sql, &args)?;
        self.debouncer.do_cloud_sync(table);
        Ok(changed)
    }

    /// Deletes the rows matched by `predicates` and returns how many were
    /// removed.
    pub fn delete(&self, predicates: &RdbPredicates) -> RdbResult<usize> {
        let table = predicates.table_name();
        let (sql, args) = build_delete(table, predicates.where_clause(), predicates.where_args())?;
        self.check_writable()?;
        let deleted = self
            .pool
            .acquire_write()?
            .execute_for_changed_row_count(&sql, &args)?;
        self.debouncer.do_cloud_sync(table);
        Ok(deleted)
    }

    /// Runs the query described by `predicates` and materializes the result.
    /// An empty column list selects every column.
    pub fn query(&self, predicates: &RdbPredicates, columns: &[&str]) -> RdbResult<SharedResultSet> {
        let (sql, args) = build_query(predicates, columns)?;
        self.query_sql(&sql, &args)
    }

    /// Runs `sql` and materializes the result. The connection is released
    /// before this returns.
    pub fn query_sql(&self, sql: &str, args: &[Value]) -> RdbResult<SharedResultSet> {
        let (_lease, stmt) = self.prepare_query(sql, args)?;
        let columns = stmt.column_names();
        let mut rows = Vec::new();
        while stmt.step()? == StepResult::Row {
            rows.push(stmt.row_values());
        }
        Ok(SharedResultSet::new(columns, rows))
    }

    /// Runs `sql` lazily. The cursor keeps a connection until it is closed
    /// or dropped.
    ///
    /// # Errors
    ///
    /// [`RdbError::InvalidStatement`] when `sql` is not a query.
    pub fn query_by_step(&self, sql: &str, args: &[Value]) -> RdbResult<StepResultSet> {
        let (lease, stmt) = self.prepare_query(sql, args)?;
        Ok(StepResultSet::new(lease, stmt))
    }

    /// Lazy variant of [`query`](Self::query).
    pub fn query_by_step_predicates(&self, predicates: &RdbPredicates, columns: &[&str]) -> RdbResult<StepResultSet> {
        let (sql, args) = build_query(predicates, columns)?;
        self.query_by_step(&sql, &args)
    }

    /// Number of rows matched by `predicates`.
    pub fn count(&self, predicates: &RdbPredicates) -> RdbResult<i64> {
        let (sql, args) = build_count(predicates)?;
        self.pool.acquire_read()?.execute_get_long(&sql, &args)
    }

    /// Executes one statement of any kind except transaction control.
    ///
    /// Schema changes reopen idle readers; mutations trigger a cloud sync of
    /// every cloud table.
    ///
    /// # Errors
    ///
    /// [`RdbError::TransactionInExecute`] for `BEGIN`/`COMMIT`/`ROLLBACK`
    /// and savepoint statements, [`RdbError::NotSupportedAttachInWalMode`]
    /// for `ATTACH` on a WAL store, or the engine error.
    pub fn execute_sql(&self, sql: &str, args: &[Value]) -> RdbResult<()> {
        self.execute_with(sql, args, SqliteConnection::execute_sql)
    }

    /// Executes `sql` and returns the first column of the first row as an
    /// integer.
    ///
    /// A statement that yields no row still runs, then fails with
    /// [`RdbError::NoRowInQuery`].
    pub fn execute_and_get_long(&self, sql: &str, args: &[Value]) -> RdbResult<i64> {
        self.execute_with(sql, args, SqliteConnection::execute_get_long)
    }

    /// Executes `sql` and returns the first column of the first row as text.
    ///
    /// A statement that yields no row still runs, then fails with
    /// [`RdbError::NoRowInQuery`].
    pub fn execute_and_get_string(&self, sql: &str, args: &[Value]) -> RdbResult<String> {
        self.execute_with(sql, args, SqliteConnection::execute_get_string)
    }

    /// Runs `sql` on the connection its type calls for, then refreshes
    /// readers after DDL and schedules a sync after writes.
    fn execute_with<T>(
        &self,
        sql: &str,
        args: &[Value],
        run: fn(&SqliteConnection, &str, &[Value]) -> RdbResult<T>,
    ) -> RdbResult<T> {
        if statement_type(sql) == StatementType::Attach {
            self.check_attach()?;
        }
        let (lease, kind, read_only) = self.begin_execute_sql(sql)?;
        let result = run(&*lease, sql, args);
        drop(lease);

        if matches!(result, Ok(_) | Err(RdbError::NoRowInQuery)) {
            if kind.is_ddl() {
                self.pool.reopen_available_read_connections()?;
            }
            if !read_only {
                self.debouncer.do_cloud_sync("");
            }
        }
        result
    }

    /// Executes an `INSERT` and returns the new rowid (`-1` if none).
    pub fn execute_for_last_inserted_row_id(&self, sql: &str, args: &[Value]) -> RdbResult<i64> {
        self.check_writable()?;
        let row_id = self
            .pool
            .acquire_write()?
            .execute_for_last_inserted_row_id(sql, args)?;
        self.debouncer.do_cloud_sync("");
        Ok(row_id)
    }

    /// Executes an `UPDATE`/`DELETE` and returns the number of changed rows.
    pub fn execute_for_changed_row_count(&self, sql: &str, args: &[Value]) -> RdbResult<usize> {
        self.check_writable()?;
        let changed = self
            .pool
            .acquire_write()?
            .execute_for_changed_row_count(sql, args)?;
        self.debouncer.do_cloud_sync("");
        Ok(changed)
    }

    /// Schema version kept in `PRAGMA user_version`.
    pub fn get_version(&self) -> RdbResult<i32> {
        let version = self.execute_and_get_long("PRAGMA user_version", &[])?;
        i32::try_from(version).map_err(|_| RdbError::Error(format!("user_version out of range: {version}")))
    }

    /// Sets `PRAGMA user_version`.
    pub fn set_version(&self, version: i32) -> RdbResult<()> {
        self.check_writable()?;
        self.pool
            .acquire_write()?
            .execute_sql(&format!("PRAGMA user_version = {version}"), &[])
    }

    pub(crate) fn check_attach(&self) -> RdbResult<()> {
        let lease = self.pool.acquire_read()?;
        if cipher::journal_mode(lease.raw())? == "WAL" {
            return Err(RdbError::NotSupportedAttachInWalMode);
        }
        Ok(())
    }
}
