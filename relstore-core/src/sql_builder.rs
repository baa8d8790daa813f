//! Builds SQL text and positional bind arguments for the facade.

use std::fmt::Write as _;

use relstore_db::Value;

use crate::error::{RdbError, RdbResult};
use crate::predicates::RdbPredicates;
use crate::sql_utils::ConflictResolution;
use crate::values_bucket::ValuesBucket;

/// SQL text plus the arguments for its `?` placeholders, in order.
pub type BoundSql = (String, Vec<Value>);

fn check_table(table: &str) -> RdbResult<()> {
    if table.trim().is_empty() {
        return Err(RdbError::EmptyTableName);
    }
    Ok(())
}

fn check_bucket(values: &ValuesBucket) -> RdbResult<()> {
    if values.is_empty() {
        return Err(RdbError::EmptyValuesBucket);
    }
    Ok(())
}

/// `INSERT[ OR x] INTO table(c1,c2) VALUES (?,?)`.
pub fn build_insert(
    table: &str,
    values: &ValuesBucket,
    conflict: ConflictResolution,
) -> RdbResult<BoundSql> {
    check_table(table)?;
    check_bucket(values)?;

    let mut sql = format!("INSERT{} INTO {table}(", conflict.clause());
    let mut args = Vec::with_capacity(values.len());
    for (i, (column, value)) in values.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        sql.push_str(column);
        args.push(value.clone());
    }
    sql.push_str(") VALUES (");
    sql.push_str(&vec!["?"; values.len()].join(","));
    sql.push(')');
    Ok((sql, args))
}

/// `UPDATE[ OR x] table SET c1=?,c2=? [WHERE ...]`; column arguments come
/// before WHERE arguments.
pub fn build_update(
    table: &str,
    values: &ValuesBucket,
    where_clause: &str,
    where_args: &[Value],
    conflict: ConflictResolution,
) -> RdbResult<BoundSql> {
    check_table(table)?;
    check_bucket(values)?;

    let mut sql = format!("UPDATE{} {table} SET ", conflict.clause());
    let mut args = Vec::with_capacity(values.len() + where_args.len());
    for (i, (column, value)) in values.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let _ = write!(sql, "{column}=?");
        args.push(value.clone());
    }
    if !where_clause.is_empty() {
        let _ = write!(sql, " WHERE {where_clause}");
    }
    args.extend_from_slice(where_args);
    Ok((sql, args))
}

/// `DELETE FROM table [WHERE ...]`.
pub fn build_delete(table: &str, where_clause: &str, where_args: &[Value]) -> RdbResult<BoundSql> {
    check_table(table)?;
    let mut sql = format!("DELETE FROM {table}");
    if !where_clause.is_empty() {
        let _ = write!(sql, " WHERE {where_clause}");
    }
    Ok((sql, where_args.to_vec()))
}

fn push_tail(sql: &mut String, predicates: &RdbPredicates) {
    if !predicates.where_clause().is_empty() {
        let _ = write!(sql, " WHERE {}", predicates.where_clause());
    }
    if !predicates.group_by_columns().is_empty() {
        let _ = write!(sql, " GROUP BY {}", predicates.group_by_columns().join(","));
    }
    if !predicates.order_by_terms().is_empty() {
        let _ = write!(sql, " ORDER BY {}", predicates.order_by_terms().join(","));
    }
    if let Some(limit) = predicates.limit_value() {
        let _ = write!(sql, " LIMIT {limit}");
    }
    if let Some(offset) = predicates.offset_value() {
        if predicates.limit_value().is_none() {
            sql.push_str(" LIMIT -1");
        }
        let _ = write!(sql, " OFFSET {offset}");
    }
}

/// `SELECT [DISTINCT] cols FROM table ...`; an empty column list selects `*`.
pub fn build_query(predicates: &RdbPredicates, columns: &[&str]) -> RdbResult<BoundSql> {
    check_table(predicates.table_name())?;
    let mut sql = String::from("SELECT ");
    if predicates.is_distinct() {
        sql.push_str("DISTINCT ");
    }
    if columns.is_empty() {
        sql.push('*');
    } else {
        sql.push_str(&columns.join(","));
    }
    let _ = write!(sql, " FROM {}", predicates.table_name());
    push_tail(&mut sql, predicates);
    Ok((sql, predicates.where_args().to_vec()))
}

/// `SELECT COUNT(*) FROM table [WHERE ...]`.
pub fn build_count(predicates: &RdbPredicates) -> RdbResult<BoundSql> {
    check_table(predicates.table_name())?;
    let mut sql = format!("SELECT COUNT(*) FROM {}", predicates.table_name());
    if !predicates.where_clause().is_empty() {
        let _ = write!(sql, " WHERE {}", predicates.where_clause());
    }
    Ok((sql, predicates.where_args().to_vec()))
}
