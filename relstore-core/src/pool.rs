//! Connection pool: one writer, a fixed set of readers, and the pool-wide
//! transaction token.
//!
//! The pool owns every connection. A caller borrows one through a
//! [`ConnectionLease`], which hands the connection back to its slot when it
//! is dropped, on every exit path. Readers are opened lazily on first lease,
//! so invalidating them (after DDL, restore or rekey) only means dropping the
//! idle ones and letting the next lease reopen them.
//!
//! Every wait is bounded by [`RdbStoreConfig::acquire_timeout`]; the pool
//! never blocks indefinitely and never holds its lock across a call into the
//! engine.

use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use relstore_db::cipher;
use zeroize::Zeroizing;

use crate::config::RdbStoreConfig;
use crate::connection::{Attachment, SqliteConnection};
use crate::error::{RdbError, RdbResult};
use crate::sql_utils::anonymous_path;

const WRITER: usize = 0;

struct Slot {
    conn: Option<SqliteConnection>,
    leased: bool,
}

impl Slot {
    const fn empty() -> Self {
        Self {
            conn: None,
            leased: false,
        }
    }
}

struct PoolState {
    slots: Vec<Slot>,
    key: Option<Zeroizing<Vec<u8>>>,
    attachments: Vec<Attachment>,
    transaction_owner: Option<ThreadId>,
    /// Bumped whenever reader connections become stale.
    generation: u64,
    draining: bool,
}

impl PoolState {
    fn busy(&self) -> usize {
        self.slots.iter().filter(|s| s.leased).count()
    }

    fn free_reader(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, s)| !s.leased)
            .map(|(i, _)| i)
    }

    fn blocked_by_foreign_owner(&self, me: ThreadId) -> bool {
        self.transaction_owner.is_some_and(|owner| owner != me)
    }
}

struct PoolShared {
    config: RdbStoreConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolShared {
    fn lock(&self) -> RdbResult<MutexGuard<'_, PoolState>> {
        self.state
            .lock()
            .map_err(|_| RdbError::lock_poisoned("connection pool"))
    }
}

/// Counters describing the pool at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Writer plus readers.
    pub total: usize,
    /// Slots not currently leased.
    pub idle: usize,
    /// Slots currently leased.
    pub busy: usize,
    /// Slots holding an open connection (idle ones only; leased connections
    /// are counted under `busy`).
    pub open_idle: usize,
}

/// Bounded set of connections to one database file.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("path", &anonymous_path(&self.shared.config.path))
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates the pool and opens the writer. Readers open on demand.
    ///
    /// # Errors
    ///
    /// Fails when the writer cannot be opened or keyed.
    pub fn open(config: RdbStoreConfig, key: Option<Zeroizing<Vec<u8>>>) -> RdbResult<Self> {
        let writer = SqliteConnection::open(&config, true, key.as_ref().map(|k| k.as_slice()), &[])?;
        let mut slots = Vec::with_capacity(1 + config.effective_read_connection_count());
        slots.push(Slot {
            conn: Some(writer),
            leased: false,
        });
        slots.extend((0..config.effective_read_connection_count()).map(|_| Slot::empty()));

        log::info!(
            "connection pool opened for {} with {} readers",
            anonymous_path(&config.path),
            slots.len() - 1
        );
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState {
                    slots,
                    key,
                    attachments: Vec::new(),
                    transaction_owner: None,
                    generation: 0,
                    draining: false,
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// Configuration the pool was opened with.
    #[must_use]
    pub fn config(&self) -> &RdbStoreConfig {
        &self.shared.config
    }

    /// Leases the writer.
    ///
    /// Waits while another lease holds it or while another thread owns the
    /// transaction token.
    ///
    /// # Errors
    ///
    /// [`RdbError::TransactionInExecute`] when the wait timed out because of
    /// another thread's transaction, [`RdbError::ConnectionOverLimit`]
    /// otherwise.
    pub fn acquire_write(&self) -> RdbResult<ConnectionLease> {
        let me = thread::current().id();
        let state = self.shared.lock()?;
        let (state, _) = self
            .shared
            .available
            .wait_timeout_while(state, self.shared.config.acquire_timeout(), |s| {
                s.draining || s.slots[WRITER].leased || s.blocked_by_foreign_owner(me)
            })
            .map_err(|_| RdbError::lock_poisoned("connection pool"))?;

        if state.blocked_by_foreign_owner(me) {
            log::warn!("write connection held by another transaction");
            return Err(RdbError::TransactionInExecute);
        }
        if state.draining || state.slots[WRITER].leased {
            log::warn!("write connection busy");
            return Err(RdbError::ConnectionOverLimit);
        }
        self.lease_slot(state, WRITER)
    }

    /// Leases a reader.
    ///
    /// Routed to the writer when the pool has no readers (zero configured,
    /// or an in-memory store) and when the calling thread owns the active
    /// transaction, so it reads its own uncommitted writes.
    ///
    /// # Errors
    ///
    /// [`RdbError::ConnectionOverLimit`] when every reader stays busy for
    /// the whole acquisition timeout.
    pub fn acquire_read(&self) -> RdbResult<ConnectionLease> {
        let me = thread::current().id();
        let state = self.shared.lock()?;
        if state.slots.len() == 1 || state.transaction_owner == Some(me) {
            drop(state);
            return self.acquire_write();
        }

        let (state, _) = self
            .shared
            .available
            .wait_timeout_while(state, self.shared.config.acquire_timeout(), |s| {
                s.draining || s.free_reader().is_none()
            })
            .map_err(|_| RdbError::lock_poisoned("connection pool"))?;

        if state.draining {
            return Err(RdbError::ConnectionOverLimit);
        }
        let Some(index) = state.free_reader() else {
            log::warn!("all read connections busy");
            return Err(RdbError::ConnectionOverLimit);
        };
        self.lease_slot(state, index)
    }

    /// Leases the writer when `want_write`, a reader otherwise.
    pub fn acquire(&self, want_write: bool) -> RdbResult<ConnectionLease> {
        if want_write {
            self.acquire_write()
        } else {
            self.acquire_read()
        }
    }

    fn lease_slot(
        &self,
        mut state: MutexGuard<'_, PoolState>,
        index: usize,
    ) -> RdbResult<ConnectionLease> {
        state.slots[index].leased = true;
        let generation = state.generation;
        if let Some(conn) = state.slots[index].conn.take() {
            return Ok(ConnectionLease {
                shared: Arc::clone(&self.shared),
                slot: index,
                generation,
                conn: Some(conn),
            });
        }

        // Open outside the lock; the slot stays leased meanwhile.
        let key = state.key.clone();
        let attachments = state.attachments.clone();
        drop(state);

        match SqliteConnection::open(
            &self.shared.config,
            index == WRITER,
            key.as_ref().map(|k| k.as_slice()),
            &attachments,
        ) {
            Ok(conn) => Ok(ConnectionLease {
                shared: Arc::clone(&self.shared),
                slot: index,
                generation,
                conn: Some(conn),
            }),
            Err(err) => {
                let mut state = self
                    .shared
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                state.slots[index].leased = false;
                drop(state);
                self.shared.available.notify_all();
                Err(err)
            }
        }
    }

    /// Takes the transaction token for the calling thread.
    ///
    /// Returns `true` when the token was newly taken and `false` when the
    /// caller already owned it (nested begin).
    ///
    /// # Errors
    ///
    /// [`RdbError::TransactionInExecute`] when another thread keeps the
    /// token for the whole acquisition timeout.
    pub fn acquire_transaction(&self) -> RdbResult<bool> {
        let me = thread::current().id();
        let state = self.shared.lock()?;
        if state.transaction_owner == Some(me) {
            return Ok(false);
        }
        let (mut state, _) = self
            .shared
            .available
            .wait_timeout_while(state, self.shared.config.acquire_timeout(), |s| {
                s.draining || s.transaction_owner.is_some()
            })
            .map_err(|_| RdbError::lock_poisoned("connection pool"))?;
        if state.draining || state.transaction_owner.is_some() {
            return Err(RdbError::TransactionInExecute);
        }
        state.transaction_owner = Some(me);
        Ok(true)
    }

    /// Gives the token back if the calling thread owns it.
    pub fn release_transaction(&self) {
        let me = thread::current().id();
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.transaction_owner == Some(me) {
            state.transaction_owner = None;
            drop(state);
            self.shared.available.notify_all();
        }
    }

    /// Thread currently owning the transaction token.
    pub fn transaction_owner(&self) -> RdbResult<Option<ThreadId>> {
        Ok(self.shared.lock()?.transaction_owner)
    }

    /// Whether the calling thread owns the transaction token.
    pub fn is_transaction_owner(&self) -> RdbResult<bool> {
        Ok(self.transaction_owner()? == Some(thread::current().id()))
    }

    /// Drops idle readers and marks busy ones stale, so every reader leased
    /// from now on sees the current schema and attachments.
    pub fn reopen_available_read_connections(&self) -> RdbResult<()> {
        let mut state = self.shared.lock()?;
        state.generation += 1;
        let stale: Vec<SqliteConnection> = state
            .slots
            .iter_mut()
            .skip(1)
            .filter_map(|slot| slot.conn.take())
            .collect();
        drop(state);
        log::debug!("closed {} idle read connections", stale.len());
        Ok(())
    }

    /// Remembers an attachment so that every connection opened later
    /// attaches it too, and invalidates the current readers.
    pub fn record_attachment(&self, attachment: Attachment) -> RdbResult<()> {
        {
            let mut state = self.shared.lock()?;
            state.attachments.retain(|a| a.alias != attachment.alias);
            state.attachments.push(attachment);
        }
        self.reopen_available_read_connections()
    }

    /// Current encryption key of the store.
    pub fn current_key(&self) -> RdbResult<Option<Zeroizing<Vec<u8>>>> {
        Ok(self.shared.lock()?.key.clone())
    }

    /// Snapshot of slot usage.
    pub fn stats(&self) -> RdbResult<PoolStats> {
        let state = self.shared.lock()?;
        let busy = state.busy();
        Ok(PoolStats {
            total: state.slots.len(),
            idle: state.slots.len() - busy,
            busy,
            open_idle: state.slots.iter().filter(|s| s.conn.is_some()).count(),
        })
    }

    /// Waits until no lease is outstanding and takes every connection out
    /// of the pool. Other callers wait while the returned guard is alive.
    fn drain(&self) -> RdbResult<DrainGuard<'_>> {
        let mut state = self.shared.lock()?;
        if state.transaction_owner.is_some() {
            return Err(RdbError::TransactionInExecute);
        }
        if state.draining {
            return Err(RdbError::StoreInUsing);
        }
        state.draining = true;

        let (mut state, _) = self
            .shared
            .available
            .wait_timeout_while(state, self.shared.config.acquire_timeout(), |s| {
                s.busy() > 0
            })
            .map_err(|_| RdbError::lock_poisoned("connection pool"))?;
        if state.busy() > 0 {
            state.draining = false;
            drop(state);
            self.shared.available.notify_all();
            log::warn!("pool drain timed out with leases outstanding");
            return Err(RdbError::StoreInUsing);
        }

        let writer = state.slots[WRITER].conn.take();
        for slot in state.slots.iter_mut().skip(1) {
            slot.conn = None;
        }
        state.generation += 1;
        let key = state.key.clone();
        let attachments = state.attachments.clone();
        Ok(DrainGuard {
            shared: &self.shared,
            writer,
            key,
            attachments,
        })
    }

    /// Swaps the database file for `backup` and reopens the pool on it.
    ///
    /// `key` is the key of the backup file; `None` keeps the current key.
    /// Either the pool ends up on the new file, or the old file is put back
    /// and the pool reopened on it with the old key.
    ///
    /// # Errors
    ///
    /// [`RdbError::TransactionInExecute`] while a transaction is active,
    /// [`RdbError::StoreInUsing`] when leases are not returned in time, or
    /// the error that made the swap fail.
    pub fn change_db_file_for_restore(
        &self,
        current: &Path,
        backup: &Path,
        key: Option<Zeroizing<Vec<u8>>>,
    ) -> RdbResult<()> {
        let mut guard = self.drain()?;
        drop(guard.writer.take());

        let old_key = guard.key.clone();
        let new_key = key.filter(|k| !k.is_empty()).or_else(|| old_key.clone());
        let parked = parked_path(current);

        fs::rename(current, &parked)?;
        remove_sidecars(current);

        let swapped = fs::copy(backup, current)
            .map_err(RdbError::from)
            .and_then(|_| guard.open_writer(new_key.as_ref()));

        match swapped {
            Ok(writer) => {
                if let Err(err) = fs::remove_file(&parked) {
                    log::warn!("failed to remove parked database file: {err}");
                }
                guard.install(writer, new_key);
                log::info!("restored {}", anonymous_path(current));
                Ok(())
            }
            Err(err) => {
                log::error!("restore of {} failed, rolling back: {err}", anonymous_path(current));
                remove_sidecars(current);
                if current.exists() {
                    if let Err(err) = fs::remove_file(current) {
                        log::warn!("failed to remove {}: {err}", anonymous_path(current));
                    }
                }
                fs::rename(&parked, current)?;
                match guard.open_writer(old_key.as_ref()) {
                    Ok(writer) => guard.install(writer, old_key),
                    Err(reopen) => {
                        // The writer reopens lazily on the next lease.
                        log::error!("reopening original database failed: {reopen}");
                    }
                }
                Err(err)
            }
        }
    }

    /// Re-encrypts the database under `new_key` and reopens readers with it.
    ///
    /// # Errors
    ///
    /// Same drain errors as [`change_db_file_for_restore`](Self::change_db_file_for_restore),
    /// or the engine error of the rekey. On failure the old key stays in use.
    pub fn change_encrypt_key(&self, new_key: Zeroizing<Vec<u8>>) -> RdbResult<()> {
        let mut guard = self.drain()?;
        let writer = match guard.writer.take() {
            Some(writer) => writer,
            None => guard.open_writer(guard.key.as_ref())?,
        };

        if let Err(err) = cipher::rekey(writer.raw(), &new_key) {
            log::error!("rekey failed: {}", err.code.0);
            let old_key = guard.key.clone();
            guard.install(writer, old_key);
            return Err(err.into());
        }
        guard.install(writer, Some(new_key));
        log::info!("encryption key changed");
        Ok(())
    }
}

/// Holds the pool in its draining state; dropping it lets waiters resume.
struct DrainGuard<'a> {
    shared: &'a PoolShared,
    writer: Option<SqliteConnection>,
    key: Option<Zeroizing<Vec<u8>>>,
    attachments: Vec<Attachment>,
}

impl DrainGuard<'_> {
    fn open_writer(&self, key: Option<&Zeroizing<Vec<u8>>>) -> RdbResult<SqliteConnection> {
        let writer = SqliteConnection::open(
            &self.shared.config,
            true,
            key.map(|k| k.as_slice()),
            &self.attachments,
        )?;
        if !cipher::integrity_check(writer.raw())? {
            return Err(RdbError::Error("database failed integrity check".to_string()));
        }
        Ok(writer)
    }

    fn install(&mut self, writer: SqliteConnection, key: Option<Zeroizing<Vec<u8>>>) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.slots[WRITER].conn = Some(writer);
        state.key = key;
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.slots[WRITER].conn.is_none() {
            state.slots[WRITER].conn = self.writer.take();
        }
        state.draining = false;
        drop(state);
        self.shared.available.notify_all();
    }
}

fn parked_path(current: &Path) -> PathBuf {
    let mut name = current.as_os_str().to_os_string();
    name.push("-restore");
    let mut parked = PathBuf::from(name);
    while parked.exists() {
        let mut name = parked.into_os_string();
        name.push("-temp");
        parked = PathBuf::from(name);
    }
    parked
}

fn remove_sidecars(db: &Path) {
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = db.as_os_str().to_os_string();
        name.push(suffix);
        let sidecar = PathBuf::from(name);
        if sidecar.exists() {
            if let Err(err) = fs::remove_file(&sidecar) {
                log::warn!("failed to remove {}: {err}", anonymous_path(&sidecar));
            }
        }
    }
}

/// A connection borrowed from the pool. Returned to its slot on drop.
pub struct ConnectionLease {
    shared: Arc<PoolShared>,
    slot: usize,
    generation: u64,
    conn: Option<SqliteConnection>,
}

impl ConnectionLease {
    /// Whether the lease holds the writer.
    #[must_use]
    pub const fn is_writer(&self) -> bool {
        self.slot == WRITER
    }
}

impl Deref for ConnectionLease {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("lease holds its connection until dropped")
    }
}

impl DerefMut for ConnectionLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("lease holds its connection until dropped")
    }
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stale = self.slot != WRITER && self.generation != state.generation;
        let slot = &mut state.slots[self.slot];
        slot.leased = false;
        let closing = if stale || slot.conn.is_some() {
            Some(conn)
        } else {
            slot.conn = Some(conn);
            None
        };
        drop(state);
        self.shared.available.notify_all();
        drop(closing);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn temp_pool(readers: usize) -> (tempfile::TempDir, ConnectionPool) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RdbStoreConfig::new(dir.path().join("pool.db"))
            .with_read_connection_count(readers)
            .with_acquire_timeout(Duration::from_millis(200));
        let pool = ConnectionPool::open(config, None).expect("open pool");
        (dir, pool)
    }

    #[test]
    fn test_second_writer_times_out() {
        let (_dir, pool) = temp_pool(2);
        let lease = pool.acquire_write().expect("first writer");
        assert!(lease.is_writer());

        let pool2 = pool.clone();
        let result = thread::spawn(move || pool2.acquire_write().map(drop))
            .join()
            .expect("join");
        match result {
            Err(RdbError::ConnectionOverLimit) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        drop(lease);
        pool.acquire_write().expect("writer after release");
    }

    #[test]
    fn test_writer_is_exclusive_under_contention() {
        let (_dir, pool) = temp_pool(2);
        let holders = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let holders = Arc::clone(&holders);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..10 {
                        if let Ok(lease) = pool.acquire_write() {
                            let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(1));
                            holders.fetch_sub(1, Ordering::SeqCst);
                            drop(lease);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_readers_exhaust_then_recover() {
        let (_dir, pool) = temp_pool(2);
        let first = pool.acquire_read().expect("reader 1");
        let second = pool.acquire_read().expect("reader 2");
        assert!(!first.is_writer());
        assert!(!second.is_writer());

        match pool.acquire_read() {
            Err(RdbError::ConnectionOverLimit) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        let stats = pool.stats().expect("stats");
        assert_eq!(stats.busy, 2);
        assert_eq!(stats.idle + stats.busy, stats.total);

        drop(first);
        drop(second);
        let stats = pool.stats().expect("stats");
        assert_eq!(stats.busy, 0);
        assert_eq!(stats.idle, stats.total);
    }

    #[test]
    fn test_zero_readers_route_to_writer() {
        let (_dir, pool) = temp_pool(0);
        let lease = pool.acquire_read().expect("read");
        assert!(lease.is_writer());
    }

    #[test]
    fn test_transaction_token_is_reentrant_and_exclusive() {
        let (_dir, pool) = temp_pool(1);
        assert!(pool.acquire_transaction().expect("first"));
        assert!(!pool.acquire_transaction().expect("nested"));
        assert!(pool.is_transaction_owner().expect("owner"));

        let pool2 = pool.clone();
        let (token, writer) = thread::spawn(move || {
            (
                pool2.acquire_transaction().map(drop),
                pool2.acquire_write().map(drop),
            )
        })
        .join()
        .expect("join");
        match token {
            Err(RdbError::TransactionInExecute) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        match writer {
            Err(RdbError::TransactionInExecute) => {}
            other => panic!("unexpected result: {other:?}"),
        }

        let owner_read = pool.acquire_read().expect("owner read");
        assert!(owner_read.is_writer());
        drop(owner_read);

        pool.release_transaction();
        assert_eq!(pool.transaction_owner().expect("owner"), None);
    }

    #[test]
    fn test_stale_reader_closed_on_release() {
        let (_dir, pool) = temp_pool(1);
        drop(pool.acquire_read().expect("warm reader"));
        assert_eq!(pool.stats().expect("stats").open_idle, 2);

        let busy = pool.acquire_read().expect("reader");
        pool.reopen_available_read_connections().expect("reopen");
        drop(busy);
        assert_eq!(pool.stats().expect("stats").open_idle, 1);

        drop(pool.acquire_read().expect("reopened reader"));
        assert_eq!(pool.stats().expect("stats").open_idle, 2);
    }

    #[test]
    fn test_drain_refused_during_transaction() {
        let (dir, pool) = temp_pool(1);
        pool.acquire_transaction().expect("token");
        let current = dir.path().join("pool.db");
        match pool.change_db_file_for_restore(&current, &current, None) {
            Err(RdbError::TransactionInExecute) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        pool.release_transaction();
    }

    #[test]
    fn test_restore_rolls_back_on_bad_backup() {
        let (dir, pool) = temp_pool(1);
        {
            let writer = pool.acquire_write().expect("writer");
            writer
                .execute_sql("CREATE TABLE t (a)", &[])
                .expect("create");
            writer
                .execute_sql("INSERT INTO t VALUES (1)", &[])
                .expect("insert");
        }

        let bogus = dir.path().join("bogus.db");
        fs::write(&bogus, vec![0xA5_u8; 4096]).expect("write bogus");
        let current = dir.path().join("pool.db");
        pool.change_db_file_for_restore(&current, &bogus, None)
            .expect_err("bogus backup must fail");

        let reader = pool.acquire_read().expect("reader");
        assert_eq!(
            reader
                .execute_get_long("SELECT count(*) FROM t", &[])
                .expect("count"),
            1
        );
    }
}
