//! Raw FFI layer over `libsqlite3-sys`.
//!
//! This is the **only** module in the crate that contains `unsafe` code or C
//! types. [`RawDb`] and [`RawStmt`] own the `sqlite3*` / `sqlite3_stmt*`
//! handles and expose plain Rust signatures to the safe wrappers.

#![allow(unsafe_code)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

mod sys {
    pub use libsqlite3_sys::*;

    // `libsqlite3-sys` blocklists `sqlite3_close_v2` from its generated
    // bindings; the symbol is still exported by the linked SQLite library.
    extern "C" {
        pub fn sqlite3_close_v2(db: *mut sqlite3) -> ::std::os::raw::c_int;
    }
}
use zeroize::Zeroize;

use super::error::{DbError, DbResult};

pub const SQLITE_OK: i32 = sys::SQLITE_OK;
#[allow(dead_code)]
pub const SQLITE_ERROR: i32 = sys::SQLITE_ERROR;
pub const SQLITE_MISUSE: i32 = sys::SQLITE_MISUSE;
#[allow(dead_code)]
pub const SQLITE_RANGE: i32 = sys::SQLITE_RANGE;
pub const SQLITE_ROW: i32 = sys::SQLITE_ROW;
pub const SQLITE_DONE: i32 = sys::SQLITE_DONE;

pub const SQLITE_INTEGER: i32 = sys::SQLITE_INTEGER;
pub const SQLITE_FLOAT: i32 = sys::SQLITE_FLOAT;
pub const SQLITE_TEXT: i32 = sys::SQLITE_TEXT;
pub const SQLITE_BLOB: i32 = sys::SQLITE_BLOB;
#[allow(dead_code)]
pub const SQLITE_NULL: i32 = sys::SQLITE_NULL;

pub const SQLITE_OPEN_READONLY: i32 = sys::SQLITE_OPEN_READONLY;
pub const SQLITE_OPEN_READWRITE: i32 = sys::SQLITE_OPEN_READWRITE;
pub const SQLITE_OPEN_CREATE: i32 = sys::SQLITE_OPEN_CREATE;
pub const SQLITE_OPEN_FULLMUTEX: i32 = sys::SQLITE_OPEN_FULLMUTEX;

fn to_cstring(text: &str, what: &str) -> DbResult<CString> {
    CString::new(text)
        .map_err(|e| DbError::new(SQLITE_MISUSE, format!("nul byte in {what}: {e}")))
}

fn errmsg_of(db: *mut sys::sqlite3) -> String {
    if db.is_null() {
        return "unknown error".to_string();
    }
    // SAFETY: `db` is a live handle; sqlite3_errmsg never returns a dangling
    // pointer while the handle is open.
    unsafe {
        let msg = sys::sqlite3_errmsg(db);
        if msg.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

// ── RawDb ───────────────────────────────────────────────────────────────

/// Owned `sqlite3*` handle. Closed with `sqlite3_close_v2` on drop, which
/// defers the actual close until every outstanding statement is finalized.
pub struct RawDb {
    db: *mut sys::sqlite3,
}

// SAFETY: handles are opened with SQLITE_OPEN_FULLMUTEX and the safe wrapper
// never shares a `RawDb` between threads without external synchronization.
unsafe impl Send for RawDb {}

impl RawDb {
    pub fn open(path: &str, flags: i32) -> DbResult<Self> {
        let c_path = to_cstring(path, "path")?;
        let mut db: *mut sys::sqlite3 = ptr::null_mut();
        // SAFETY: `c_path` is NUL-terminated and `db` is a valid out-pointer.
        let rc = unsafe {
            sys::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null())
        };
        if rc != SQLITE_OK {
            let message = if db.is_null() {
                format!("sqlite3_open_v2 returned {rc}")
            } else {
                let m = errmsg_of(db);
                // SAFETY: the handle was allocated by sqlite3_open_v2 above.
                unsafe {
                    sys::sqlite3_close_v2(db);
                }
                m
            };
            return Err(DbError::new(rc, message));
        }
        Ok(Self { db })
    }

    pub fn exec(&self, sql: &str) -> DbResult<()> {
        let c_sql = to_cstring(sql, "SQL")?;
        self.exec_cstr(&c_sql)
    }

    /// Same as [`exec`](Self::exec) but wipes the C copy of the statement
    /// text once the engine is done with it.
    pub fn exec_zeroized(&self, sql: &str) -> DbResult<()> {
        let c_sql = to_cstring(sql, "SQL")?;
        let result = self.exec_cstr(&c_sql);
        let mut bytes = c_sql.into_bytes_with_nul();
        bytes.zeroize();
        result
    }

    fn exec_cstr(&self, c_sql: &CStr) -> DbResult<()> {
        let mut errmsg: *mut c_char = ptr::null_mut();
        // SAFETY: the handle is open, `c_sql` outlives the call, and no
        // callback is registered.
        let rc = unsafe {
            sys::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if rc == SQLITE_OK {
            return Ok(());
        }
        let message = if errmsg.is_null() {
            errmsg_of(self.db)
        } else {
            // SAFETY: sqlite3_exec allocated `errmsg` with sqlite3_malloc.
            unsafe {
                let m = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                sys::sqlite3_free(errmsg.cast());
                m
            }
        };
        Err(DbError::new(rc, message))
    }

    pub fn prepare(&self, sql: &str) -> DbResult<RawStmt> {
        let c_sql = to_cstring(sql, "SQL")?;
        let mut stmt: *mut sys::sqlite3_stmt = ptr::null_mut();
        // SAFETY: the handle is open and `stmt` is a valid out-pointer.
        let rc = unsafe {
            sys::sqlite3_prepare_v2(self.db, c_sql.as_ptr(), -1, &mut stmt, ptr::null_mut())
        };
        if rc != SQLITE_OK {
            return Err(DbError::new(rc, errmsg_of(self.db)));
        }
        if stmt.is_null() {
            // Empty input or a comment only.
            return Err(DbError::new(SQLITE_MISUSE, "no statement to prepare"));
        }
        Ok(RawStmt { stmt, db: self.db })
    }

    pub fn changes(&self) -> i64 {
        // SAFETY: the handle is open.
        i64::from(unsafe { sys::sqlite3_changes(self.db) })
    }

    pub fn last_insert_rowid(&self) -> i64 {
        // SAFETY: the handle is open.
        unsafe { sys::sqlite3_last_insert_rowid(self.db) }
    }

    pub fn busy_timeout(&self, millis: i32) -> DbResult<()> {
        // SAFETY: the handle is open.
        let rc = unsafe { sys::sqlite3_busy_timeout(self.db, millis) };
        if rc != SQLITE_OK {
            return Err(DbError::new(rc, errmsg_of(self.db)));
        }
        Ok(())
    }

    pub fn is_autocommit(&self) -> bool {
        // SAFETY: the handle is open.
        unsafe { sys::sqlite3_get_autocommit(self.db) != 0 }
    }

    /// Copies the whole `main` schema of `self` into `dest` with the online
    /// backup API, in a single step.
    pub fn backup_to(&self, dest: &Self) -> DbResult<()> {
        let main = to_cstring("main", "schema")?;
        // SAFETY: both handles are open and distinct.
        unsafe {
            let backup = sys::sqlite3_backup_init(dest.db, main.as_ptr(), self.db, main.as_ptr());
            if backup.is_null() {
                return Err(DbError::new(
                    sys::sqlite3_errcode(dest.db),
                    errmsg_of(dest.db),
                ));
            }
            let step_rc = sys::sqlite3_backup_step(backup, -1);
            let finish_rc = sys::sqlite3_backup_finish(backup);
            if step_rc != SQLITE_DONE {
                return Err(DbError::new(step_rc, errmsg_of(dest.db)));
            }
            if finish_rc != SQLITE_OK {
                return Err(DbError::new(finish_rc, errmsg_of(dest.db)));
            }
        }
        Ok(())
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: the handle is owned by this value and closed exactly once.
            unsafe {
                sys::sqlite3_close_v2(self.db);
            }
            self.db = ptr::null_mut();
        }
    }
}

// ── RawStmt ─────────────────────────────────────────────────────────────

/// Owned `sqlite3_stmt*` handle, finalized on drop.
pub struct RawStmt {
    stmt: *mut sys::sqlite3_stmt,
    db: *mut sys::sqlite3,
}

// SAFETY: a statement is only ever driven by the thread that currently owns
// it; the parent handle is opened in serialized (FULLMUTEX) mode.
unsafe impl Send for RawStmt {}

impl RawStmt {
    fn check(&self, rc: c_int) -> DbResult<()> {
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(DbError::new(rc, errmsg_of(self.db)))
        }
    }

    fn index(idx: usize) -> c_int {
        c_int::try_from(idx).unwrap_or(c_int::MAX)
    }

    pub fn bind_i64(&self, idx: usize, value: i64) -> DbResult<()> {
        // SAFETY: the statement is live; out-of-range indexes yield SQLITE_RANGE.
        self.check(unsafe { sys::sqlite3_bind_int64(self.stmt, Self::index(idx), value) })
    }

    pub fn bind_f64(&self, idx: usize, value: f64) -> DbResult<()> {
        // SAFETY: see `bind_i64`.
        self.check(unsafe { sys::sqlite3_bind_double(self.stmt, Self::index(idx), value) })
    }

    pub fn bind_text(&self, idx: usize, value: &str) -> DbResult<()> {
        let len = c_int::try_from(value.len())
            .map_err(|_| DbError::new(sys::SQLITE_TOOBIG, "text too large to bind"))?;
        // SAFETY: SQLITE_TRANSIENT makes the engine copy the buffer before return.
        self.check(unsafe {
            sys::sqlite3_bind_text(
                self.stmt,
                Self::index(idx),
                value.as_ptr().cast(),
                len,
                sys::SQLITE_TRANSIENT(),
            )
        })
    }

    pub fn bind_blob(&self, idx: usize, value: &[u8]) -> DbResult<()> {
        let len = c_int::try_from(value.len())
            .map_err(|_| DbError::new(sys::SQLITE_TOOBIG, "blob too large to bind"))?;
        // SAFETY: SQLITE_TRANSIENT makes the engine copy the buffer before return.
        self.check(unsafe {
            sys::sqlite3_bind_blob(
                self.stmt,
                Self::index(idx),
                value.as_ptr().cast(),
                len,
                sys::SQLITE_TRANSIENT(),
            )
        })
    }

    pub fn bind_null(&self, idx: usize) -> DbResult<()> {
        // SAFETY: see `bind_i64`.
        self.check(unsafe { sys::sqlite3_bind_null(self.stmt, Self::index(idx)) })
    }

    pub fn bind_parameter_count(&self) -> usize {
        // SAFETY: the statement is live.
        usize::try_from(unsafe { sys::sqlite3_bind_parameter_count(self.stmt) }).unwrap_or(0)
    }

    pub fn clear_bindings(&self) -> DbResult<()> {
        // SAFETY: the statement is live.
        self.check(unsafe { sys::sqlite3_clear_bindings(self.stmt) })
    }

    /// Returns the raw step code (`SQLITE_ROW`, `SQLITE_DONE` or an error).
    pub fn step(&self) -> DbResult<i32> {
        // SAFETY: the statement is live.
        let rc = unsafe { sys::sqlite3_step(self.stmt) };
        match rc {
            SQLITE_ROW | SQLITE_DONE => Ok(rc),
            _ => Err(DbError::new(rc, errmsg_of(self.db))),
        }
    }

    pub fn reset(&self) -> DbResult<()> {
        // SAFETY: the statement is live.
        self.check(unsafe { sys::sqlite3_reset(self.stmt) })
    }

    pub fn is_readonly(&self) -> bool {
        // SAFETY: the statement is live.
        unsafe { sys::sqlite3_stmt_readonly(self.stmt) != 0 }
    }

    pub fn column_count(&self) -> usize {
        // SAFETY: the statement is live.
        usize::try_from(unsafe { sys::sqlite3_column_count(self.stmt) }).unwrap_or(0)
    }

    pub fn column_name(&self, idx: usize) -> String {
        // SAFETY: the statement is live; the returned pointer is valid until
        // the next call on this statement, and we copy it immediately.
        unsafe {
            let name = sys::sqlite3_column_name(self.stmt, Self::index(idx));
            if name.is_null() {
                String::new()
            } else {
                CStr::from_ptr(name).to_string_lossy().into_owned()
            }
        }
    }

    pub fn column_type(&self, idx: usize) -> i32 {
        // SAFETY: the statement is live.
        unsafe { sys::sqlite3_column_type(self.stmt, Self::index(idx)) }
    }

    pub fn column_i64(&self, idx: usize) -> i64 {
        // SAFETY: the statement is live.
        unsafe { sys::sqlite3_column_int64(self.stmt, Self::index(idx)) }
    }

    pub fn column_f64(&self, idx: usize) -> f64 {
        // SAFETY: the statement is live.
        unsafe { sys::sqlite3_column_double(self.stmt, Self::index(idx)) }
    }

    pub fn column_text(&self, idx: usize) -> String {
        // SAFETY: text pointer and byte length are read back to back and
        // copied before any further call on the statement.
        unsafe {
            let text = sys::sqlite3_column_text(self.stmt, Self::index(idx));
            let len = sys::sqlite3_column_bytes(self.stmt, Self::index(idx));
            if text.is_null() || len <= 0 {
                return String::new();
            }
            let bytes = std::slice::from_raw_parts(text, usize::try_from(len).unwrap_or(0));
            String::from_utf8_lossy(bytes).into_owned()
        }
    }

    pub fn column_blob(&self, idx: usize) -> Vec<u8> {
        // SAFETY: see `column_text`.
        unsafe {
            let blob = sys::sqlite3_column_blob(self.stmt, Self::index(idx));
            let len = sys::sqlite3_column_bytes(self.stmt, Self::index(idx));
            if blob.is_null() || len <= 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(blob.cast::<u8>(), usize::try_from(len).unwrap_or(0))
                .to_vec()
        }
    }
}

impl Drop for RawStmt {
    fn drop(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: the statement is owned by this value and finalized once.
            unsafe {
                sys::sqlite3_finalize(self.stmt);
            }
            self.stmt = ptr::null_mut();
        }
    }
}
