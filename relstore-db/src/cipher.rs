//! Encryption keying and per-connection configuration.
//!
//! # Keying flow
//!
//! 1. **Open** -- the file is opaque until a key is supplied.
//! 2. **Probe** -- `PRAGMA cipher_version` returns a row only when the engine
//!    was built with SQLCipher. A plain build silently ignores `PRAGMA key`,
//!    so keying without this check would write an unencrypted file.
//! 3. **Key** -- `PRAGMA key = "x'<hex>'"` passes the raw key bytes. The
//!    `x'...'` form tells SQLCipher to skip its passphrase KDF.
//! 4. **Verify** -- reading `sqlite_master` touches the first page; a wrong
//!    key fails here with `SQLITE_NOTADB` instead of later during use.
//!
//! Every string that carries key material is wrapped in [`Zeroizing`].

use zeroize::Zeroizing;

use super::connection::Connection;
use super::error::{DbError, DbResult};
use super::ffi;
use super::value::Value;

/// Returns whether the linked engine supports page encryption.
pub fn cipher_available(conn: &Connection) -> DbResult<bool> {
    let version = conn.query_row_optional("PRAGMA cipher_version;", &[], |stmt| {
        Ok(stmt.column_text(0))
    })?;
    Ok(version.is_some_and(|v| !v.trim().is_empty()))
}

/// Formats `key` as the raw-key literal understood by SQLCipher.
#[must_use]
pub fn raw_key_literal(key: &[u8]) -> Zeroizing<String> {
    let key_hex = Zeroizing::new(hex::encode(key));
    Zeroizing::new(format!("x'{}'", key_hex.as_str()))
}

/// The raw-key literal as a bind value, for `ATTACH ... KEY ?`.
#[must_use]
pub fn key_bind_value(key: &[u8]) -> Value {
    if key.is_empty() {
        return Value::Text(String::new());
    }
    Value::Text(raw_key_literal(key).to_string())
}

/// Applies `key` to a freshly opened connection and verifies it.
pub fn apply_key(conn: &Connection, key: &[u8]) -> DbResult<()> {
    if !cipher_available(conn)? {
        return Err(DbError::new(
            ffi::SQLITE_MISUSE,
            "encryption requested but the engine was built without cipher support",
        ));
    }
    let literal = raw_key_literal(key);
    let pragma = Zeroizing::new(format!("PRAGMA key = \"{}\";", literal.as_str()));
    conn.execute_batch_zeroized(&pragma)?;

    conn.execute_batch("SELECT count(*) FROM sqlite_master;")
        .map_err(|e| {
            DbError::new(
                e.code.0,
                format!(
                    "encryption key verification failed (is the key correct?): {}",
                    e.message
                ),
            )
        })
}

/// Re-encrypts the database under `new_key`. The connection must already be
/// keyed with the current key.
pub fn rekey(conn: &Connection, new_key: &[u8]) -> DbResult<()> {
    if !cipher_available(conn)? {
        return Err(DbError::new(
            ffi::SQLITE_MISUSE,
            "rekey requested but the engine was built without cipher support",
        ));
    }
    let literal = raw_key_literal(new_key);
    let pragma = Zeroizing::new(format!("PRAGMA rekey = \"{}\";", literal.as_str()));
    conn.execute_batch_zeroized(&pragma)
}

/// Applies the journal mode and page size on the write connection.
///
/// `page_size` only takes effect before the first table is created.
pub fn configure_connection(
    conn: &Connection,
    journal_mode: &str,
    page_size: Option<u32>,
) -> DbResult<()> {
    if let Some(size) = page_size {
        conn.execute_batch(&format!("PRAGMA page_size = {size};"))?;
    }
    // journal_mode returns a row, so it is read rather than batched.
    conn.query_row(
        &format!("PRAGMA journal_mode = {journal_mode};"),
        &[],
        |stmt| Ok(stmt.column_text(0)),
    )?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

/// Current journal mode, upper-cased (`WAL`, `DELETE`, `MEMORY`, ...).
pub fn journal_mode(conn: &Connection) -> DbResult<String> {
    let mode = conn.query_row("PRAGMA journal_mode;", &[], |stmt| Ok(stmt.column_text(0)))?;
    Ok(mode.to_ascii_uppercase())
}

/// Runs `PRAGMA integrity_check` and returns whether the database is healthy.
pub fn integrity_check(conn: &Connection) -> DbResult<bool> {
    let result = conn.query_row("PRAGMA integrity_check;", &[], |stmt| {
        Ok(stmt.column_text(0))
    })?;
    Ok(result.trim() == "ok")
}
