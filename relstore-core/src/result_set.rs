//! Cursors over query results.
//!
//! Positions are zero-based. `-1` is before the first row and `row_count`
//! is after the last one; navigation that lands outside the rows returns
//! `Ok(false)` and leaves the cursor at the nearest edge.

use relstore_db::{Statement, StepResult, Value};

use crate::error::{RdbError, RdbResult};
use crate::pool::ConnectionLease;

/// Row navigation and typed column access.
pub trait ResultSet {
    /// Number of rows.
    fn row_count(&mut self) -> RdbResult<usize>;

    /// Result column names, in order.
    fn column_names(&self) -> RdbResult<Vec<String>>;

    /// Current position (`-1` before the first row).
    fn row_position(&self) -> RdbResult<i64>;

    /// Moves to `position`. Returns whether the cursor is on a row.
    fn go_to_row(&mut self, position: i64) -> RdbResult<bool>;

    /// Column `index` of the current row.
    fn get_value(&self, index: usize) -> RdbResult<Value>;

    /// Releases the underlying resources. Later calls fail with
    /// [`RdbError::StepResultClosed`].
    fn close(&mut self);

    /// Whether [`close`](Self::close) was called.
    fn is_closed(&self) -> bool;

    /// Number of result columns.
    fn column_count(&self) -> RdbResult<usize> {
        Ok(self.column_names()?.len())
    }

    /// Index of the column called `name`.
    fn column_index(&self, name: &str) -> RdbResult<usize> {
        self.column_names()?
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| RdbError::InvalidArgs(format!("no column named {name}")))
    }

    /// Moves by `offset` rows relative to the current position.
    fn go_to(&mut self, offset: i64) -> RdbResult<bool> {
        let target = self.row_position()?.saturating_add(offset);
        self.go_to_row(target)
    }

    /// Moves to the first row.
    fn go_to_first(&mut self) -> RdbResult<bool> {
        self.go_to_row(0)
    }

    /// Moves to the last row.
    fn go_to_last(&mut self) -> RdbResult<bool> {
        let count = to_position(self.row_count()?);
        self.go_to_row(count - 1)
    }

    /// Moves to the next row.
    fn go_to_next(&mut self) -> RdbResult<bool> {
        self.go_to(1)
    }

    /// Moves to the previous row.
    fn go_to_previous(&mut self) -> RdbResult<bool> {
        self.go_to(-1)
    }

    /// Whether the cursor is on the first row.
    fn is_at_first_row(&self) -> RdbResult<bool> {
        Ok(self.row_position()? == 0)
    }

    /// Whether the cursor is on the last row.
    fn is_at_last_row(&mut self) -> RdbResult<bool> {
        let count = to_position(self.row_count()?);
        Ok(count > 0 && self.row_position()? == count - 1)
    }

    /// Whether the cursor has moved off the "before first" position.
    fn is_started(&self) -> RdbResult<bool> {
        Ok(self.row_position()? >= 0)
    }

    /// Whether the cursor is after the last row.
    fn is_ended(&mut self) -> RdbResult<bool> {
        let count = to_position(self.row_count()?);
        Ok(self.row_position()? >= count)
    }

    /// Integer view of column `index`.
    fn get_long(&self, index: usize) -> RdbResult<i64> {
        match self.get_value(index)? {
            Value::Blob(_) => Err(RdbError::InvalidColumnType(index)),
            value => Ok(value.as_i64()),
        }
    }

    /// Float view of column `index`.
    fn get_double(&self, index: usize) -> RdbResult<f64> {
        match self.get_value(index)? {
            Value::Blob(_) => Err(RdbError::InvalidColumnType(index)),
            value => Ok(value.as_f64()),
        }
    }

    /// Text view of column `index`.
    fn get_string(&self, index: usize) -> RdbResult<String> {
        Ok(self.get_value(index)?.as_text())
    }

    /// Blob view of column `index`.
    fn get_blob(&self, index: usize) -> RdbResult<Vec<u8>> {
        Ok(self.get_value(index)?.as_blob())
    }

    /// Whether column `index` is NULL.
    fn is_column_null(&self, index: usize) -> RdbResult<bool> {
        Ok(self.get_value(index)?.is_null())
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn to_position(count: usize) -> i64 {
    count as i64
}

fn cell(row: Option<&Vec<Value>>, position: i64, index: usize) -> RdbResult<Value> {
    let Some(row) = row else {
        return Err(if position < 0 {
            RdbError::NoRowInQuery
        } else {
            RdbError::StepResultIsAfterLast
        });
    };
    row.get(index)
        .cloned()
        .ok_or(RdbError::InvalidColumnIndex(index))
}

/// Fully materialized result set. The connection was released before the
/// caller got it.
#[derive(Debug, Clone)]
pub struct SharedResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: i64,
    closed: bool,
}

impl SharedResultSet {
    pub(crate) const fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: -1,
            closed: false,
        }
    }

    fn check_open(&self) -> RdbResult<()> {
        if self.closed {
            return Err(RdbError::StepResultClosed);
        }
        Ok(())
    }
}

impl ResultSet for SharedResultSet {
    fn row_count(&mut self) -> RdbResult<usize> {
        self.check_open()?;
        Ok(self.rows.len())
    }

    fn column_names(&self) -> RdbResult<Vec<String>> {
        self.check_open()?;
        Ok(self.columns.clone())
    }

    fn row_position(&self) -> RdbResult<i64> {
        self.check_open()?;
        Ok(self.position)
    }

    fn go_to_row(&mut self, position: i64) -> RdbResult<bool> {
        self.check_open()?;
        let count = to_position(self.rows.len());
        self.position = position.clamp(-1, count);
        Ok((0..count).contains(&self.position))
    }

    fn get_value(&self, index: usize) -> RdbResult<Value> {
        self.check_open()?;
        let row = usize::try_from(self.position)
            .ok()
            .and_then(|p| self.rows.get(p));
        cell(row, self.position, index)
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Lazily stepped result set.
///
/// Holds its lease until closed or dropped. Moving backwards re-runs the
/// statement from the start.
pub struct StepResultSet {
    // Declared before `lease` so the statement is finalized first.
    stmt: Option<Statement>,
    lease: Option<ConnectionLease>,
    columns: Vec<String>,
    position: i64,
    current: Option<Vec<Value>>,
    done: bool,
    row_count: Option<usize>,
}

impl std::fmt::Debug for StepResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepResultSet")
            .field("columns", &self.columns)
            .field("position", &self.position)
            .field("closed", &self.stmt.is_none())
            .field("on_writer", &self.lease.as_ref().map(ConnectionLease::is_writer))
            .finish_non_exhaustive()
    }
}

impl StepResultSet {
    pub(crate) fn new(lease: ConnectionLease, stmt: Statement) -> Self {
        let columns = stmt.column_names();
        Self {
            stmt: Some(stmt),
            lease: Some(lease),
            columns,
            position: -1,
            current: None,
            done: false,
            row_count: None,
        }
    }

    fn stmt(&self) -> RdbResult<&Statement> {
        self.stmt.as_ref().ok_or(RdbError::StepResultClosed)
    }

    fn rewind(&mut self) -> RdbResult<()> {
        self.stmt()?.reset()?;
        self.position = -1;
        self.current = None;
        self.done = false;
        Ok(())
    }

    fn step(&mut self) -> RdbResult<bool> {
        if self.done {
            return Ok(false);
        }
        let stmt = self.stmt()?;
        match stmt.step()? {
            StepResult::Row => {
                self.current = Some(stmt.row_values());
                self.position += 1;
                Ok(true)
            }
            StepResult::Done => {
                self.current = None;
                self.done = true;
                self.position += 1;
                self.row_count = usize::try_from(self.position).ok();
                Ok(false)
            }
        }
    }
}

impl ResultSet for StepResultSet {
    fn row_count(&mut self) -> RdbResult<usize> {
        self.stmt()?;
        if let Some(count) = self.row_count {
            return Ok(count);
        }
        let back_to = self.position;
        while self.step()? {}
        let count = self.row_count.unwrap_or(0);
        self.go_to_row(back_to)?;
        Ok(count)
    }

    fn column_names(&self) -> RdbResult<Vec<String>> {
        self.stmt()?;
        Ok(self.columns.clone())
    }

    fn row_position(&self) -> RdbResult<i64> {
        self.stmt()?;
        Ok(self.position)
    }

    fn go_to_row(&mut self, position: i64) -> RdbResult<bool> {
        self.stmt()?;
        if position < 0 {
            self.rewind()?;
            return Ok(false);
        }
        if position < self.position {
            self.rewind()?;
        }
        if position == self.position {
            return Ok(self.current.is_some());
        }
        while self.position < position {
            if !self.step()? {
                return Ok(false);
            }
        }
        Ok(self.current.is_some())
    }

    fn get_value(&self, index: usize) -> RdbResult<Value> {
        self.stmt()?;
        cell(self.current.as_ref(), self.position, index)
    }

    fn close(&mut self) {
        self.stmt = None;
        self.current = None;
        self.lease = None;
    }

    fn is_closed(&self) -> bool {
        self.stmt.is_none()
    }
}
