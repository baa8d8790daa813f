//! Integration tests: store.

mod common;

use relstore_core::{
    ConflictResolution, JournalMode, RdbError, RdbPredicates, RdbStore, RdbStoreConfig, ResultSet,
    StoreServices, Value, ValuesBucket,
};
use test_case::test_case;

fn person(id: i64, name: &str, age: i64) -> ValuesBucket {
    ValuesBucket::new()
        .with("id", id)
        .with("name", name)
        .with("age", age)
        .with("salary", 100.5)
        .with("blob_type", vec![1_u8, 2, 3])
}

fn fixture() -> (std::path::PathBuf, RdbStore) {
    let root = common::temp_root();
    let store = common::open_test_store(common::test_config(&root, "crud.db"), StoreServices::default());
    (root, store)
}

#[test]
fn test_insert_query_update_delete() {
    let (root, store) = fixture();

    assert_eq!(store.insert("test", &person(1, "zhangsan", 18)).expect("insert"), 1);
    assert_eq!(store.insert("test", &person(2, "lisi", 19)).expect("insert"), 2);

    let mut rows = store
        .query(&RdbPredicates::new("test").order_by_asc("id"), &[])
        .expect("query");
    assert_eq!(rows.row_count().expect("count"), 2);
    assert!(rows.go_to_first().expect("first"));
    let name = rows.column_index("name").expect("name index");
    assert_eq!(rows.get_string(name).expect("name"), "zhangsan");
    let salary = rows.column_index("salary").expect("salary index");
    assert!((rows.get_double(salary).expect("salary") - 100.5).abs() < f64::EPSILON);
    let blob = rows.column_index("blob_type").expect("blob index");
    assert_eq!(rows.get_blob(blob).expect("blob"), vec![1, 2, 3]);

    let changed = store
        .update(
            &ValuesBucket::new().with("age", 30),
            &RdbPredicates::new("test").equal_to("name", "lisi"),
        )
        .expect("update");
    assert_eq!(changed, 1);
    let age = store
        .execute_and_get_long("SELECT age FROM test WHERE id = ?", &[Value::from(2)])
        .expect("age");
    assert_eq!(age, 30);

    let deleted = store
        .delete(&RdbPredicates::new("test").less_than("age", 20))
        .expect("delete");
    assert_eq!(deleted, 1);
    assert_eq!(store.count(&RdbPredicates::new("test")).expect("count"), 1);

    common::cleanup(&root);
}

#[test]
fn test_batch_insert_counts_rows() {
    let (root, store) = fixture();
    let rows = vec![person(1, "a", 1), person(2, "b", 2), person(3, "c", 3)];
    assert_eq!(store.batch_insert("test", &rows).expect("batch"), 3);
    assert_eq!(store.count(&RdbPredicates::new("test")).expect("count"), 3);
    assert!(!store.is_in_transaction().expect("in transaction"));
    common::cleanup(&root);
}

#[test]
fn test_batch_insert_is_all_or_nothing() {
    let (root, store) = fixture();
    store.insert("test", &person(2, "existing", 2)).expect("insert");

    let rows = vec![person(1, "a", 1), person(2, "dup", 2), person(3, "c", 3)];
    match store.batch_insert("test", &rows) {
        Err(RdbError::Sqlite(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(store.count(&RdbPredicates::new("test")).expect("count"), 1);
    assert!(!store.is_in_transaction().expect("in transaction"));
    common::cleanup(&root);
}

#[test]
fn test_batch_insert_validates_before_touching_the_pool() {
    let (root, store) = fixture();
    assert_eq!(store.batch_insert("test", &[]).expect("empty batch"), 0);
    match store.batch_insert("", &[person(1, "a", 1)]) {
        Err(RdbError::EmptyTableName) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    match store.batch_insert("test", &[person(1, "a", 1), ValuesBucket::new()]) {
        Err(RdbError::EmptyValuesBucket) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(store.count(&RdbPredicates::new("test")).expect("count"), 0);
    common::cleanup(&root);
}

#[test]
fn test_conflict_resolution() {
    let (root, store) = fixture();
    store.insert("test", &person(1, "first", 1)).expect("insert");

    match store.insert("test", &person(1, "second", 2)) {
        Err(RdbError::Sqlite(err)) => {
            assert_eq!(err.code.primary(), relstore_db::codes::SQLITE_CONSTRAINT);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    let ignored = store
        .insert_with_conflict_resolution("test", &person(1, "second", 2), ConflictResolution::Ignore)
        .expect("ignore");
    assert_eq!(ignored, -1);

    store.replace("test", &person(1, "third", 3)).expect("replace");
    let name = store
        .execute_and_get_string("SELECT name FROM test WHERE id = 1", &[])
        .expect("name");
    assert_eq!(name, "third");
    common::cleanup(&root);
}

#[test_case("BEGIN TRANSACTION" ; "begin")]
#[test_case("COMMIT" ; "commit")]
#[test_case("ROLLBACK" ; "rollback")]
#[test_case("SAVEPOINT sp" ; "savepoint")]
#[test_case("RELEASE sp" ; "release")]
fn test_execute_sql_rejects_transaction_control(sql: &str) {
    let (root, store) = fixture();
    match store.execute_sql(sql, &[]) {
        Err(RdbError::TransactionInExecute) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    common::cleanup(&root);
}

#[test]
fn test_ddl_is_visible_to_later_reads() {
    let (root, store) = fixture();
    // Lease every reader once so they hold the old schema.
    for _ in 0..4 {
        store.count(&RdbPredicates::new("test")).expect("count");
    }
    store
        .execute_sql("CREATE TABLE extra (k TEXT PRIMARY KEY, v TEXT)", &[])
        .expect("create");
    store
        .insert("extra", &ValuesBucket::new().with("k", "a").with("v", "b"))
        .expect("insert");
    assert_eq!(store.count(&RdbPredicates::new("extra")).expect("count"), 1);
    common::cleanup(&root);
}

#[test]
fn test_bind_argument_count_is_checked() {
    let (root, store) = fixture();
    match store.query_sql("SELECT * FROM test WHERE id = ? AND name = ?", &[Value::from(1)]) {
        Err(RdbError::InvalidBindArgsCount { expected: 2, actual: 1 }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    common::cleanup(&root);
}

#[test]
fn test_query_by_step() {
    let (root, store) = fixture();
    for id in 1..=5 {
        store.insert("test", &person(id, "n", id * 10)).expect("insert");
    }

    let mut rows = store
        .query_by_step("SELECT id, age FROM test WHERE age > ? ORDER BY id", &[Value::from(15)])
        .expect("query");
    assert_eq!(rows.column_names().expect("columns"), vec!["id", "age"]);
    assert!(rows.go_to_next().expect("next"));
    assert_eq!(rows.get_long(0).expect("id"), 2);
    assert!(rows.go_to_row(3).expect("row 3"));
    assert_eq!(rows.get_long(0).expect("id"), 5);
    assert!(rows.go_to_previous().expect("back"));
    assert_eq!(rows.get_long(1).expect("age"), 40);
    assert_eq!(rows.row_count().expect("count"), 4);
    assert_eq!(rows.row_position().expect("position"), 2);
    assert!(!rows.go_to_row(10).expect("past end"));
    match rows.get_long(0) {
        Err(RdbError::StepResultIsAfterLast) => {}
        other => panic!("unexpected result: {other:?}"),
    }

    rows.close();
    match rows.go_to_first() {
        Err(RdbError::StepResultClosed) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    match store.query_by_step("DELETE FROM test", &[]) {
        Err(RdbError::InvalidStatement(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(store.count(&RdbPredicates::new("test")).expect("count"), 5);
    common::cleanup(&root);
}

#[test]
fn test_predicate_paging() {
    let (root, store) = fixture();
    for id in 1..=6 {
        store.insert("test", &person(id, "n", id)).expect("insert");
    }
    let predicates = RdbPredicates::new("test")
        .greater_than("age", 1)
        .order_by_desc("id")
        .limit(2)
        .offset(1);
    let mut rows = store.query(&predicates, &["id"]).expect("query");
    assert_eq!(rows.row_count().expect("count"), 2);
    rows.go_to_first().expect("first");
    assert_eq!(rows.get_long(0).expect("id"), 5);
    rows.go_to_next().expect("next");
    assert_eq!(rows.get_long(0).expect("id"), 4);
    common::cleanup(&root);
}

#[test]
fn test_version_round_trip() {
    let (root, store) = fixture();
    assert_eq!(store.get_version().expect("version"), 0);
    store.set_version(3).expect("set version");
    assert_eq!(store.get_version().expect("version"), 3);
    common::cleanup(&root);
}

#[test]
fn test_execute_passthroughs() {
    let (root, store) = fixture();
    let id = store
        .execute_for_last_inserted_row_id(
            "INSERT INTO test (name, age) VALUES (?, ?)",
            &[Value::from("x"), Value::from(1)],
        )
        .expect("insert");
    assert_eq!(id, 1);
    let changed = store
        .execute_for_changed_row_count("UPDATE test SET age = age + 1", &[])
        .expect("update");
    assert_eq!(changed, 1);
    match store.execute_and_get_long("SELECT age FROM test WHERE id = 99", &[]) {
        Err(RdbError::NoRowInQuery) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    common::cleanup(&root);
}

#[test]
fn test_ddl_through_value_passthrough_still_runs() {
    let (root, store) = fixture();
    // Warm every reader so the schema change has cached connections to refresh.
    for _ in 0..4 {
        store.count(&RdbPredicates::new("test")).expect("count");
    }
    match store.execute_and_get_string("CREATE TABLE extra (id INTEGER PRIMARY KEY)", &[]) {
        Err(RdbError::NoRowInQuery) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    store
        .insert("extra", &ValuesBucket::new().with("id", 7))
        .expect("insert into new table");
    assert_eq!(store.count(&RdbPredicates::new("extra")).expect("count"), 1);

    let stats = store.pool_stats().expect("stats");
    assert_eq!(stats.busy, 0);
    common::cleanup(&root);
}

#[test]
fn test_read_only_store_rejects_mutations() {
    let root = common::temp_root();
    {
        let config = common::test_config(&root, "ro.db").with_journal_mode(JournalMode::Delete);
        let store = common::open_test_store(config, StoreServices::default());
        store.insert("test", &person(1, "a", 1)).expect("insert");
    }

    let config = common::test_config(&root, "ro.db")
        .with_journal_mode(JournalMode::Delete)
        .with_read_only(true);
    let store = RdbStore::open(config).expect("open read-only");
    assert!(store.is_read_only());
    match store.insert("test", &person(2, "b", 2)) {
        Err(RdbError::CannotUpdateReadOnly) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    match store.execute_sql("DELETE FROM test", &[]) {
        Err(RdbError::CannotUpdateReadOnly) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(store.count(&RdbPredicates::new("test")).expect("count"), 1);
    common::cleanup(&root);
}

#[test]
fn test_memory_store() {
    let store = RdbStore::open(RdbStoreConfig::memory("scratch")).expect("open");
    assert!(store.is_memory_rdb());
    store.execute_sql(common::CREATE_TABLE_TEST, &[]).expect("create");
    store.insert("test", &person(1, "a", 1)).expect("insert");
    assert_eq!(store.count(&RdbPredicates::new("test")).expect("count"), 1);
    let stats = store.pool_stats().expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.busy, 0);
}

#[test]
fn test_open_rejects_relative_path() {
    match RdbStore::open(RdbStoreConfig::new("relative.db")) {
        Err(RdbError::InvalidFilePath) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_open_creates_missing_directory() {
    let root = common::temp_root();
    let config = common::test_config(&root.join("nested/dir"), "deep.db");
    let store = RdbStore::open(config).expect("open");
    assert!(store.path().exists());
    common::cleanup(&root);
}
