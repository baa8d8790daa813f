//! Distributed-sync capability and the cloud-sync debouncer.
//!
//! Sync itself lives behind [`SyncBackend`], chosen when the store is
//! composed; [`NoopSyncBackend`] stands in where no sync service exists.
//! Mutations on cloud tables are coalesced by [`CloudSyncDebouncer`] into
//! one delayed sync per interval.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{DistributedType, SecurityLevel};
use crate::error::{RdbError, RdbResult};

/// Which side wins during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Push local changes to remote devices.
    Push,
    /// Pull remote changes.
    Pull,
    /// Most recent change wins.
    TimeFirst,
    /// Local data wins.
    NativeFirst,
    /// Cloud data wins.
    CloudFirst,
}

/// Options for one sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOption {
    /// Conflict policy.
    pub mode: SyncMode,
    /// Wait for completion instead of returning after submission.
    pub is_block: bool,
}

impl SyncOption {
    /// Non-blocking time-first sync, used by the debouncer.
    #[must_use]
    pub const fn background() -> Self {
        Self {
            mode: SyncMode::TimeFirst,
            is_block: false,
        }
    }
}

/// Per-table distribution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistributedConfig {
    /// Sync cloud tables automatically after local mutations.
    pub auto_sync: bool,
}

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMode {
    /// Changes pulled from other devices.
    Remote,
    /// Changes pulled from the cloud.
    Cloud,
}

/// Receiver of data-change notifications.
pub trait RdbStoreObserver: Send + Sync {
    /// Called with the devices or tables whose data changed.
    fn on_change(&self, changed: &[String]);
}

/// Per-table (or per-device) sync result codes.
pub type SyncDetails = BTreeMap<String, i32>;

/// Identity of a store as seen by the sync service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreIdentity {
    /// Store name.
    pub name: String,
    /// Owning application bundle.
    pub bundle_name: String,
    /// Protection class.
    pub security_level: SecurityLevel,
}

/// Distributed-sync service.
pub trait SyncBackend: Send + Sync {
    /// Registers `tables` of `store` for distribution.
    fn set_distributed_tables(
        &self,
        store: &StoreIdentity,
        tables: &[String],
        kind: DistributedType,
        config: &DistributedConfig,
    ) -> RdbResult<()>;

    /// Syncs `tables` of `store`. An empty list means every distributed
    /// table.
    fn sync(&self, store: &StoreIdentity, option: &SyncOption, tables: &[String]) -> RdbResult<SyncDetails>;

    /// Starts forwarding changes of `store` to `observer`.
    fn subscribe(
        &self,
        store: &StoreIdentity,
        mode: SubscribeMode,
        observer: Arc<dyn RdbStoreObserver>,
    ) -> RdbResult<()>;

    /// Stops forwarding changes to `observer`.
    fn unsubscribe(
        &self,
        store: &StoreIdentity,
        mode: SubscribeMode,
        observer: &Arc<dyn RdbStoreObserver>,
    ) -> RdbResult<()>;
}

/// Backend for platforms without a sync service; every call reports
/// [`RdbError::NotSupport`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSyncBackend;

impl SyncBackend for NoopSyncBackend {
    fn set_distributed_tables(
        &self,
        _store: &StoreIdentity,
        _tables: &[String],
        _kind: DistributedType,
        _config: &DistributedConfig,
    ) -> RdbResult<()> {
        Err(RdbError::NotSupport("distributed tables".to_string()))
    }

    fn sync(&self, _store: &StoreIdentity, _option: &SyncOption, _tables: &[String]) -> RdbResult<SyncDetails> {
        Err(RdbError::NotSupport("sync".to_string()))
    }

    fn subscribe(
        &self,
        _store: &StoreIdentity,
        _mode: SubscribeMode,
        _observer: Arc<dyn RdbStoreObserver>,
    ) -> RdbResult<()> {
        Err(RdbError::NotSupport("subscribe".to_string()))
    }

    fn unsubscribe(
        &self,
        _store: &StoreIdentity,
        _mode: SubscribeMode,
        _observer: &Arc<dyn RdbStoreObserver>,
    ) -> RdbResult<()> {
        Err(RdbError::NotSupport("unsubscribe".to_string()))
    }
}

/// Deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after a delay, off the calling thread.
pub trait TaskExecutor: Send + Sync {
    /// Runs `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task);
}

/// Executor that sleeps on a fresh thread per task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTaskExecutor;

impl TaskExecutor for ThreadTaskExecutor {
    fn schedule(&self, delay: Duration, task: Task) {
        let spawned = thread::Builder::new()
            .name("relstore-sync".to_string())
            .spawn(move || {
                thread::sleep(delay);
                task();
            });
        if let Err(err) = spawned {
            log::error!("failed to spawn sync task: {err}");
        }
    }
}

/// Coalesces cloud-table mutations into one delayed sync per interval.
///
/// The scheduled task only captures shared snapshots (pending set, backend,
/// identity), so it completes harmlessly after the store is gone.
pub struct CloudSyncDebouncer {
    identity: StoreIdentity,
    interval: Duration,
    backend: Arc<dyn SyncBackend>,
    executor: Arc<dyn TaskExecutor>,
    cloud_tables: RwLock<BTreeSet<String>>,
    pending: Arc<Mutex<BTreeSet<String>>>,
}

impl std::fmt::Debug for CloudSyncDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSyncDebouncer")
            .field("store", &self.identity.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl CloudSyncDebouncer {
    /// Debouncer for `identity` with no cloud tables registered.
    pub fn new(
        identity: StoreIdentity,
        interval: Duration,
        backend: Arc<dyn SyncBackend>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            identity,
            interval,
            backend,
            executor,
            cloud_tables: RwLock::new(BTreeSet::new()),
            pending: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Replaces the set of tables synced automatically.
    pub fn set_cloud_tables(&self, tables: impl IntoIterator<Item = String>) {
        let mut cloud = self
            .cloud_tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *cloud = tables.into_iter().collect();
    }

    /// Tables synced automatically.
    #[must_use]
    pub fn cloud_tables(&self) -> Vec<String> {
        self.cloud_tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Tables waiting for the scheduled sync.
    #[must_use]
    pub fn pending_tables(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Notes a mutation of `table` (empty: unknown table, so every cloud
    /// table) and schedules a sync unless one is already pending.
    pub fn do_cloud_sync(&self, table: &str) {
        let cloud = self
            .cloud_tables
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if cloud.is_empty() || (!table.is_empty() && !cloud.contains(table)) {
            return;
        }

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let schedule = pending.is_empty();
        if table.is_empty() {
            pending.extend(cloud.iter().cloned());
        } else {
            pending.insert(table.to_string());
        }
        drop(pending);
        drop(cloud);
        if !schedule {
            return;
        }

        let pending = Arc::clone(&self.pending);
        let backend = Arc::clone(&self.backend);
        let identity = self.identity.clone();
        log::debug!("cloud sync scheduled in {:?}", self.interval);
        self.executor.schedule(
            self.interval,
            Box::new(move || {
                let tables: Vec<String> = std::mem::take(
                    &mut *pending.lock().unwrap_or_else(PoisonError::into_inner),
                )
                .into_iter()
                .collect();
                if tables.is_empty() {
                    return;
                }
                if let Err(err) = backend.sync(&identity, &SyncOption::background(), &tables) {
                    log::warn!("cloud sync of {} tables failed: {err}", tables.len());
                }
            }),
        );
    }
}
