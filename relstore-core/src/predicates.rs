//! Structured WHERE / ORDER BY / GROUP BY / LIMIT description.

use relstore_db::Value;

/// Conditions and clauses for one table, rendered into SQL by
/// [`sql_builder`](crate::sql_builder).
///
/// Conditions are joined with `AND` unless [`or`](Self::or) was called
/// right before.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RdbPredicates {
    table: String,
    where_clause: String,
    where_args: Vec<Value>,
    order_by: Vec<String>,
    group_by: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    distinct: bool,
    next_joiner: Option<&'static str>,
}

impl RdbPredicates {
    /// Predicates over `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Target table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Rendered WHERE clause without the keyword.
    #[must_use]
    pub fn where_clause(&self) -> &str {
        &self.where_clause
    }

    /// Positional arguments for the WHERE clause.
    #[must_use]
    pub fn where_args(&self) -> &[Value] {
        &self.where_args
    }

    /// ORDER BY terms.
    #[must_use]
    pub fn order_by_terms(&self) -> &[String] {
        &self.order_by
    }

    /// GROUP BY columns.
    #[must_use]
    pub fn group_by_columns(&self) -> &[String] {
        &self.group_by
    }

    /// LIMIT value.
    #[must_use]
    pub const fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    /// OFFSET value.
    #[must_use]
    pub const fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    /// Whether `SELECT DISTINCT` is requested.
    #[must_use]
    pub const fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Replaces the WHERE clause with raw SQL and its arguments.
    #[must_use]
    pub fn set_where_clause(mut self, clause: impl Into<String>, args: Vec<Value>) -> Self {
        self.where_clause = clause.into();
        self.where_args = args;
        self.next_joiner = None;
        self
    }

    fn push_condition(mut self, condition: String, args: impl IntoIterator<Item = Value>) -> Self {
        if !self.where_clause.is_empty() {
            self.where_clause.push(' ');
            self.where_clause.push_str(self.next_joiner.unwrap_or("AND"));
            self.where_clause.push(' ');
        }
        self.where_clause.push_str(&condition);
        self.where_args.extend(args);
        self.next_joiner = None;
        self
    }

    /// `field = ?`
    #[must_use]
    pub fn equal_to(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(format!("{field} = ?"), [value.into()])
    }

    /// `field <> ?`
    #[must_use]
    pub fn not_equal_to(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(format!("{field} <> ?"), [value.into()])
    }

    /// `field > ?`
    #[must_use]
    pub fn greater_than(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(format!("{field} > ?"), [value.into()])
    }

    /// `field >= ?`
    #[must_use]
    pub fn greater_than_or_equal_to(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(format!("{field} >= ?"), [value.into()])
    }

    /// `field < ?`
    #[must_use]
    pub fn less_than(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(format!("{field} < ?"), [value.into()])
    }

    /// `field <= ?`
    #[must_use]
    pub fn less_than_or_equal_to(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_condition(format!("{field} <= ?"), [value.into()])
    }

    /// `field LIKE ?`
    #[must_use]
    pub fn like(self, field: &str, pattern: impl Into<String>) -> Self {
        self.push_condition(format!("{field} LIKE ?"), [Value::Text(pattern.into())])
    }

    /// `field BETWEEN ? AND ?`
    #[must_use]
    pub fn between(self, field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_condition(format!("{field} BETWEEN ? AND ?"), [low.into(), high.into()])
    }

    /// `field IN (?, ...)`
    #[must_use]
    pub fn in_values<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let marks = vec!["?"; values.len()].join(", ");
        self.push_condition(format!("{field} IN ({marks})"), values)
    }

    /// `field IS NULL`
    #[must_use]
    pub fn is_null(self, field: &str) -> Self {
        self.push_condition(format!("{field} IS NULL"), [])
    }

    /// `field IS NOT NULL`
    #[must_use]
    pub fn is_not_null(self, field: &str) -> Self {
        self.push_condition(format!("{field} IS NOT NULL"), [])
    }

    /// Joins the next condition with `AND` (the default).
    #[must_use]
    pub fn and(mut self) -> Self {
        self.next_joiner = Some("AND");
        self
    }

    /// Joins the next condition with `OR`.
    #[must_use]
    pub fn or(mut self) -> Self {
        self.next_joiner = Some("OR");
        self
    }

    /// Appends `field ASC` to ORDER BY.
    #[must_use]
    pub fn order_by_asc(mut self, field: &str) -> Self {
        self.order_by.push(format!("{field} ASC"));
        self
    }

    /// Appends `field DESC` to ORDER BY.
    #[must_use]
    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order_by.push(format!("{field} DESC"));
        self
    }

    /// Appends columns to GROUP BY.
    #[must_use]
    pub fn group_by<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Sets LIMIT.
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets OFFSET.
    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Requests `SELECT DISTINCT`.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}
