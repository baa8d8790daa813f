//! Integration tests: cloud sync.

mod common;

use std::sync::Arc;
use std::time::Duration;

use relstore_core::{
    DistributedConfig, DistributedType, RdbError, RdbPredicates, RdbStore, RdbStoreObserver,
    StoreServices, SubscribeMode, SyncMode, SyncOption, ValuesBucket,
};

use common::{ManualExecutor, RecordingSyncBackend};

struct Fixture {
    root: std::path::PathBuf,
    store: RdbStore,
    backend: Arc<RecordingSyncBackend>,
    executor: Arc<ManualExecutor>,
}

fn fixture() -> Fixture {
    let root = common::temp_root();
    let backend = Arc::new(RecordingSyncBackend::default());
    let executor = Arc::new(ManualExecutor::default());
    let services = StoreServices {
        sync_backend: backend.clone(),
        executor: executor.clone(),
        ..StoreServices::default()
    };
    let store = common::open_test_store(common::test_config(&root, "sync.db"), services);
    store
        .execute_sql("CREATE TABLE local (id INTEGER PRIMARY KEY)", &[])
        .expect("create local");
    Fixture {
        root,
        store,
        backend,
        executor,
    }
}

fn row(name: &str) -> ValuesBucket {
    ValuesBucket::new().with("name", name)
}

fn register_cloud(store: &RdbStore) {
    store
        .set_distributed_tables(
            &["test".to_string()],
            DistributedType::Cloud,
            &DistributedConfig { auto_sync: true },
        )
        .expect("set distributed tables");
}

#[test]
fn test_burst_of_mutations_schedules_one_sync() {
    let f = fixture();
    register_cloud(&f.store);
    assert_eq!(f.store.cloud_tables(), vec!["test"]);

    for i in 0..5 {
        f.store.insert("test", &row(&format!("r{i}"))).expect("insert");
    }
    f.store
        .update(&row("renamed"), &RdbPredicates::new("test").equal_to("id", 1))
        .expect("update");
    assert_eq!(f.executor.scheduled(), 1);
    assert_eq!(f.executor.delays(), vec![Duration::from_millis(50)]);

    f.executor.run_all();
    assert_eq!(
        *f.backend.syncs.lock().expect("lock"),
        vec![vec!["test".to_string()]]
    );

    f.store.insert("test", &row("later")).expect("insert");
    assert_eq!(f.executor.scheduled(), 1);
    common::cleanup(&f.root);
}

#[test]
fn test_non_cloud_tables_do_not_schedule() {
    let f = fixture();
    f.store.insert("test", &row("before registration")).expect("insert");
    register_cloud(&f.store);
    f.store
        .insert("local", &ValuesBucket::new().with("id", 1))
        .expect("insert local");
    f.store.query(&RdbPredicates::new("test"), &[]).expect("query");
    assert_eq!(f.executor.scheduled(), 0);
    common::cleanup(&f.root);
}

#[test]
fn test_generic_mutation_syncs_every_cloud_table() {
    let f = fixture();
    register_cloud(&f.store);
    f.store
        .execute_sql("DELETE FROM local", &[])
        .expect("delete");
    assert_eq!(f.executor.scheduled(), 1);
    f.executor.run_all();
    assert_eq!(
        *f.backend.syncs.lock().expect("lock"),
        vec![vec!["test".to_string()]]
    );
    common::cleanup(&f.root);
}

#[test]
fn test_value_passthrough_write_schedules_sync() {
    let f = fixture();
    register_cloud(&f.store);
    let id = f
        .store
        .execute_and_get_long("INSERT INTO test (name) VALUES ('x') RETURNING id", &[])
        .expect("insert returning");
    assert_eq!(id, 1);
    assert_eq!(f.executor.scheduled(), 1);

    f.store
        .execute_and_get_long("SELECT count(*) FROM test", &[])
        .expect("count");
    f.executor.run_all();
    assert_eq!(f.backend.syncs.lock().expect("lock").len(), 1);
    common::cleanup(&f.root);
}

#[test]
fn test_device_distribution_does_not_enable_auto_sync() {
    let f = fixture();
    f.store
        .set_distributed_tables(
            &["test".to_string()],
            DistributedType::Device,
            &DistributedConfig { auto_sync: true },
        )
        .expect("set distributed tables");
    assert!(f.store.cloud_tables().is_empty());
    assert_eq!(f.backend.distributed.lock().expect("lock").len(), 1);
    common::cleanup(&f.root);
}

#[test]
fn test_sync_passthrough() {
    let f = fixture();
    let option = SyncOption {
        mode: SyncMode::Push,
        is_block: true,
    };
    let details = f
        .store
        .sync(&option, &["test".to_string()])
        .expect("sync");
    assert_eq!(details.get("test"), Some(&0));
    common::cleanup(&f.root);
}

struct NullObserver;

impl RdbStoreObserver for NullObserver {
    fn on_change(&self, _tables: &[String]) {}
}

#[test]
fn test_subscribe_and_unsubscribe() {
    let f = fixture();
    let observer: Arc<dyn RdbStoreObserver> = Arc::new(NullObserver);
    f.store
        .subscribe(SubscribeMode::Remote, Arc::clone(&observer))
        .expect("subscribe");
    assert_eq!(f.backend.observers.lock().expect("lock").len(), 1);
    f.store
        .unsubscribe(SubscribeMode::Remote, &observer)
        .expect("unsubscribe");
    assert!(f.backend.observers.lock().expect("lock").is_empty());
    common::cleanup(&f.root);
}

#[test]
fn test_default_services_report_not_supported() {
    let root = common::temp_root();
    let store = RdbStore::open(common::test_config(&root, "plain.db")).expect("open");
    match store.set_distributed_tables(
        &["test".to_string()],
        DistributedType::Cloud,
        &DistributedConfig { auto_sync: true },
    ) {
        Err(RdbError::NotSupport(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(store.cloud_tables().is_empty());
    match store.sync(&SyncOption::background(), &[]) {
        Err(RdbError::NotSupport(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    common::cleanup(&root);
}
