//! The store facade.
//!
//! [`RdbStore`] validates input, routes each statement to a read or write
//! connection, coordinates explicit transactions and notifies the cloud-sync
//! debouncer after mutations. Operations are split by family:
//!
//! * `crud`: insert, update, delete, query, generic SQL.
//! * `transaction`: begin / commit / rollback and lock lending.
//! * `backup`: backup, restore, attach, key rotation.
//! * `distributed`: distributed tables, sync, subscriptions.

use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

use relstore_db::Statement;
use zeroize::Zeroizing;

use crate::cloud_sync::{
    CloudSyncDebouncer, NoopSyncBackend, StoreIdentity, SyncBackend, TaskExecutor,
    ThreadTaskExecutor,
};
use crate::config::RdbStoreConfig;
use crate::error::{RdbError, RdbResult};
use crate::pool::{ConnectionLease, ConnectionPool, PoolStats};
use crate::security::{KeyFileType, RdbSecurityManager};
use crate::sql_utils::{anonymous_path, statement_type, StatementType};
use crate::transaction::TransactionCoordinator;

mod backup;
mod crud;
mod distributed;
mod transaction;

/// Collaborators injected into a store when it is opened.
#[derive(Clone)]
pub struct StoreServices {
    /// Key manager for stores opened with `encrypt`.
    pub security: Option<Arc<RdbSecurityManager>>,
    /// Distributed-sync service.
    pub sync_backend: Arc<dyn SyncBackend>,
    /// Runs the debounced cloud-sync task.
    pub executor: Arc<dyn TaskExecutor>,
}

impl Default for StoreServices {
    fn default() -> Self {
        Self {
            security: None,
            sync_backend: Arc::new(NoopSyncBackend),
            executor: Arc::new(ThreadTaskExecutor),
        }
    }
}

impl std::fmt::Debug for StoreServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreServices")
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

/// A relational store over one database file.
///
/// Safe to share between threads (`Arc<RdbStore>`); every operation leases
/// a connection for its own duration only.
pub struct RdbStore {
    config: RdbStoreConfig,
    pool: ConnectionPool,
    transactions: Mutex<TransactionCoordinator>,
    security: Option<Arc<RdbSecurityManager>>,
    sync_backend: Arc<dyn SyncBackend>,
    debouncer: CloudSyncDebouncer,
    identity: StoreIdentity,
}

impl std::fmt::Debug for RdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdbStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RdbStore {
    /// Opens a store with default services: no key manager, no sync
    /// service, thread-per-task executor.
    ///
    /// # Errors
    ///
    /// See [`open_with`](Self::open_with).
    pub fn open(config: RdbStoreConfig) -> RdbResult<Self> {
        Self::open_with(config, StoreServices::default())
    }

    /// Opens a store.
    ///
    /// Encrypted stores take their key from `config.encrypt_key`, or from
    /// the security manager when `config.encrypt` is set. If the current key
    /// file no longer opens the database and a rotated key is pending, the
    /// rotated key is used and promoted. Expired managed keys are rotated.
    ///
    /// # Errors
    ///
    /// Configuration errors, [`RdbError::CreateFolderFail`], key errors, or
    /// the engine error of the first connection.
    pub fn open_with(config: RdbStoreConfig, services: StoreServices) -> RdbResult<Self> {
        config.validate()?;
        if !config.is_memory() {
            let dir = config.db_dir();
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| RdbError::CreateFolderFail(e.to_string()))?;
            }
        }

        let managed = config.encrypt && config.encrypt_key.as_ref().map_or(true, |k| k.is_empty());
        let (pool, key_expired) = if managed {
            let security = services.security.as_ref().ok_or_else(|| {
                RdbError::InvalidArgs("encrypted store requires a security manager".to_string())
            })?;
            open_managed_pool(&config, security)?
        } else {
            let key = config
                .encrypt_key
                .clone()
                .filter(|k| !k.is_empty());
            (ConnectionPool::open(config.clone(), key)?, false)
        };

        let identity = StoreIdentity {
            name: config.name.clone(),
            bundle_name: config.bundle_name.clone(),
            security_level: config.security_level,
        };
        let store = Self {
            debouncer: CloudSyncDebouncer::new(
                identity.clone(),
                config.sync_interval(),
                Arc::clone(&services.sync_backend),
                Arc::clone(&services.executor),
            ),
            identity,
            transactions: Mutex::new(TransactionCoordinator::default()),
            security: services.security,
            sync_backend: services.sync_backend,
            pool,
            config,
        };

        if key_expired {
            log::info!("store key expired, rotating");
            if let Err(err) = store.rotate_encrypt_key() {
                log::warn!("rotating expired key failed: {err}");
            }
        }
        log::info!("opened store {}", anonymous_path(&store.config.path));
        Ok(store)
    }

    /// Configuration the store was opened with.
    #[must_use]
    pub const fn config(&self) -> &RdbStoreConfig {
        &self.config
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.config.path
    }

    /// Whether the store rejects mutations.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Whether the store lives in memory.
    #[must_use]
    pub fn is_memory_rdb(&self) -> bool {
        self.config.is_memory()
    }

    /// Whether the store is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.config.is_encrypted()
    }

    /// Snapshot of connection usage.
    pub fn pool_stats(&self) -> RdbResult<PoolStats> {
        self.pool.stats()
    }

    /// Tables the cloud-sync debouncer currently tracks.
    #[must_use]
    pub fn cloud_tables(&self) -> Vec<String> {
        self.debouncer.cloud_tables()
    }

    pub(crate) fn check_writable(&self) -> RdbResult<()> {
        if self.config.read_only {
            return Err(RdbError::CannotUpdateReadOnly);
        }
        Ok(())
    }

    pub(crate) fn lock_transactions(&self) -> RdbResult<MutexGuard<'_, TransactionCoordinator>> {
        self.transactions
            .lock()
            .map_err(|_| RdbError::lock_poisoned("transaction stack"))
    }

    /// Leases the connection `sql` should run on.
    ///
    /// The statement kind picks a first guess; the engine's own read-only
    /// classification of the compiled statement decides. Transaction-control
    /// statements are refused: they must go through the transaction API.
    pub(crate) fn begin_execute_sql(&self, sql: &str) -> RdbResult<(ConnectionLease, StatementType, bool)> {
        let kind = statement_type(sql);
        if kind.is_special() {
            return Err(RdbError::TransactionInExecute);
        }

        let assume_read_only = kind.is_read_only();
        let lease = self.pool.acquire(!assume_read_only)?;
        let (_, read_only) = lease.prepare(sql)?;
        if !read_only && self.config.read_only {
            return Err(RdbError::CannotUpdateReadOnly);
        }
        if read_only == assume_read_only || (read_only && lease.is_writer()) {
            return Ok((lease, kind, read_only));
        }

        drop(lease);
        let lease = self.pool.acquire(!read_only)?;
        if !read_only && !lease.is_writer() {
            return Err(RdbError::ExecuteWriteInReadConnection);
        }
        Ok((lease, kind, read_only))
    }

    /// Prepares `sql` on a read connection and checks it is a query.
    pub(crate) fn prepare_query(&self, sql: &str, args: &[relstore_db::Value]) -> RdbResult<(ConnectionLease, Statement)> {
        let lease = self.pool.acquire_read()?;
        let (stmt, read_only) = lease.prepare_bound(sql, args)?;
        if !read_only {
            return Err(RdbError::InvalidStatement("not a query".to_string()));
        }
        Ok((lease, stmt))
    }
}

/// Opens the pool with the managed key, falling back to a pending rotated
/// key. Returns whether the key in use has expired.
fn open_managed_pool(config: &RdbStoreConfig, security: &RdbSecurityManager) -> RdbResult<(ConnectionPool, bool)> {
    let path = &config.path;
    let password = security.get_rdb_password(path, KeyFileType::Pub)?;
    match ConnectionPool::open(config.clone(), Some(password.to_key())) {
        Ok(pool) => Ok((pool, password.is_key_expired())),
        Err(err) if security.is_key_file_exists(path, KeyFileType::New) => {
            log::warn!("current key rejected ({err}), trying rotated key");
            let rotated = security.load_secret_key_from_file(path, KeyFileType::New)?;
            let pool = ConnectionPool::open(config.clone(), Some(rotated.to_key()))?;
            security.update_key_file(path)?;
            Ok((pool, false))
        }
        Err(err) => Err(err),
    }
}

/// Clones a caller key into a zeroizing buffer; empty means none.
pub(crate) fn optional_key(key: Option<&[u8]>) -> Option<Zeroizing<Vec<u8>>> {
    key.filter(|k| !k.is_empty())
        .map(|k| Zeroizing::new(k.to_vec()))
}
