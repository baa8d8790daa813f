//! Common test utilities shared across integration tests.
#![allow(missing_docs, dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relstore_core::{
    DistributedConfig, DistributedType, RdbResult, RdbStore, RdbStoreConfig, RdbStoreObserver,
    StoreIdentity, StoreServices, SubscribeMode, SyncBackend, SyncDetails, SyncOption, Task,
    TaskExecutor,
};
use uuid::Uuid;

#[allow(dead_code)]
pub const CREATE_TABLE_TEST: &str =
    "CREATE TABLE IF NOT EXISTS test (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, age INTEGER, salary REAL, blob_type BLOB)";

#[allow(dead_code)]
pub fn temp_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("relstore-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&path).expect("create temp root");
    path
}

#[allow(dead_code)]
pub fn cleanup(root: &Path) {
    let _ = std::fs::remove_dir_all(root);
}

/// Config for `<root>/<name>` with short timeouts so contention tests
/// finish quickly.
#[allow(dead_code)]
pub fn test_config(root: &Path, name: &str) -> RdbStoreConfig {
    RdbStoreConfig::new(root.join(name))
        .with_acquire_timeout(Duration::from_millis(300))
        .with_sync_interval(Duration::from_millis(50))
}

/// Opens a store and creates the `test` table.
#[allow(dead_code)]
pub fn open_test_store(config: RdbStoreConfig, services: StoreServices) -> RdbStore {
    let store = RdbStore::open_with(config, services).expect("open store");
    store.execute_sql(CREATE_TABLE_TEST, &[]).expect("create table");
    store
}

/// Executor that queues tasks until the test runs them.
#[allow(dead_code)]
#[derive(Default)]
pub struct ManualExecutor {
    tasks: Mutex<Vec<(Duration, Task)>>,
}

#[allow(dead_code)]
impl ManualExecutor {
    pub fn scheduled(&self) -> usize {
        self.tasks.lock().expect("lock").len()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.tasks.lock().expect("lock").iter().map(|(d, _)| *d).collect()
    }

    pub fn run_all(&self) {
        let tasks: Vec<_> = self.tasks.lock().expect("lock").drain(..).collect();
        for (_, task) in tasks {
            task();
        }
    }
}

impl TaskExecutor for ManualExecutor {
    fn schedule(&self, delay: Duration, task: Task) {
        self.tasks.lock().expect("lock").push((delay, task));
    }
}

/// Sync service that records every call.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingSyncBackend {
    pub distributed: Mutex<Vec<(Vec<String>, DistributedType)>>,
    pub syncs: Mutex<Vec<Vec<String>>>,
    pub observers: Mutex<Vec<Arc<dyn RdbStoreObserver>>>,
}

impl SyncBackend for RecordingSyncBackend {
    fn set_distributed_tables(
        &self,
        _store: &StoreIdentity,
        tables: &[String],
        kind: DistributedType,
        _config: &DistributedConfig,
    ) -> RdbResult<()> {
        self.distributed
            .lock()
            .expect("lock")
            .push((tables.to_vec(), kind));
        Ok(())
    }

    fn sync(&self, _store: &StoreIdentity, _option: &SyncOption, tables: &[String]) -> RdbResult<SyncDetails> {
        self.syncs.lock().expect("lock").push(tables.to_vec());
        Ok(tables.iter().map(|t| (t.clone(), 0)).collect())
    }

    fn subscribe(
        &self,
        _store: &StoreIdentity,
        _mode: SubscribeMode,
        observer: Arc<dyn RdbStoreObserver>,
    ) -> RdbResult<()> {
        self.observers.lock().expect("lock").push(observer);
        Ok(())
    }

    fn unsubscribe(
        &self,
        _store: &StoreIdentity,
        _mode: SubscribeMode,
        observer: &Arc<dyn RdbStoreObserver>,
    ) -> RdbResult<()> {
        self.observers
            .lock()
            .expect("lock")
            .retain(|o| !Arc::ptr_eq(o, observer));
        Ok(())
    }
}
