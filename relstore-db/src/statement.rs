//! Safe wrapper around a `SQLite` prepared statement.
//!
//! No `unsafe` here; everything goes through [`RawStmt`].

use super::error::DbResult;
use super::ffi::{self, RawStmt};
use super::value::Value;

/// Result of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available.
    Row,
    /// The statement has finished executing.
    Done,
}

/// Storage class of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `SQLITE_INTEGER`
    Integer,
    /// `SQLITE_FLOAT`
    Float,
    /// `SQLITE_TEXT`
    Text,
    /// `SQLITE_BLOB`
    Blob,
    /// `SQLITE_NULL`
    Null,
}

/// A prepared statement, finalized on drop.
///
/// A statement does not borrow its [`Connection`](super::Connection): the
/// engine keeps the handle alive until the last statement is finalized, so a
/// statement may be stored next to the lease that produced it.
pub struct Statement {
    raw: RawStmt,
}

impl Statement {
    pub(crate) const fn new(raw: RawStmt) -> Self {
        Self { raw }
    }

    /// Binds `values` to parameters `1..=values.len()`.
    pub fn bind_values(&self, values: &[Value]) -> DbResult<()> {
        for (i, value) in values.iter().enumerate() {
            let idx = i + 1;
            match value {
                Value::Integer(v) => self.raw.bind_i64(idx, *v)?,
                Value::Real(v) => self.raw.bind_f64(idx, *v)?,
                Value::Text(v) => self.raw.bind_text(idx, v)?,
                Value::Blob(v) => self.raw.bind_blob(idx, v)?,
                Value::Null => self.raw.bind_null(idx)?,
            }
        }
        Ok(())
    }

    /// Number of `?` placeholders in the compiled statement.
    #[must_use]
    pub fn bind_parameter_count(&self) -> usize {
        self.raw.bind_parameter_count()
    }

    /// Resets all bindings to NULL.
    pub fn clear_bindings(&self) -> DbResult<()> {
        self.raw.clear_bindings()
    }

    /// Executes a single step.
    pub fn step(&self) -> DbResult<StepResult> {
        match self.raw.step()? {
            ffi::SQLITE_ROW => Ok(StepResult::Row),
            _ => Ok(StepResult::Done),
        }
    }

    /// Rewinds the statement so it can be stepped again. Bindings are kept.
    pub fn reset(&self) -> DbResult<()> {
        self.raw.reset()
    }

    /// Whether the engine classifies the statement as not writing to the
    /// database file.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.raw.is_readonly()
    }

    /// Number of result columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.raw.column_count()
    }

    /// Name of result column `idx`.
    #[must_use]
    pub fn column_name(&self, idx: usize) -> String {
        self.raw.column_name(idx)
    }

    /// All result column names, in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        (0..self.column_count()).map(|i| self.column_name(i)).collect()
    }

    /// Storage class of column `idx` on the current row.
    #[must_use]
    pub fn column_type(&self, idx: usize) -> ColumnType {
        match self.raw.column_type(idx) {
            ffi::SQLITE_INTEGER => ColumnType::Integer,
            ffi::SQLITE_FLOAT => ColumnType::Float,
            ffi::SQLITE_TEXT => ColumnType::Text,
            ffi::SQLITE_BLOB => ColumnType::Blob,
            _ => ColumnType::Null,
        }
    }

    /// Returns `true` if the column is SQL NULL.
    #[must_use]
    pub fn is_column_null(&self, idx: usize) -> bool {
        self.column_type(idx) == ColumnType::Null
    }

    /// Reads a column as `i64`.
    #[must_use]
    pub fn column_i64(&self, idx: usize) -> i64 {
        self.raw.column_i64(idx)
    }

    /// Reads a column as `f64`.
    #[must_use]
    pub fn column_f64(&self, idx: usize) -> f64 {
        self.raw.column_f64(idx)
    }

    /// Reads a column as UTF-8 text. Empty for NULL.
    #[must_use]
    pub fn column_text(&self, idx: usize) -> String {
        self.raw.column_text(idx)
    }

    /// Reads a column as a blob. Empty for NULL.
    #[must_use]
    pub fn column_blob(&self, idx: usize) -> Vec<u8> {
        self.raw.column_blob(idx)
    }

    /// Reads a column keeping its storage class.
    #[must_use]
    pub fn column_value(&self, idx: usize) -> Value {
        match self.column_type(idx) {
            ColumnType::Integer => Value::Integer(self.column_i64(idx)),
            ColumnType::Float => Value::Real(self.column_f64(idx)),
            ColumnType::Text => Value::Text(self.column_text(idx)),
            ColumnType::Blob => Value::Blob(self.column_blob(idx)),
            ColumnType::Null => Value::Null,
        }
    }

    /// Reads every column of the current row.
    #[must_use]
    pub fn row_values(&self) -> Vec<Value> {
        (0..self.column_count()).map(|i| self.column_value(i)).collect()
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement").finish_non_exhaustive()
    }
}
