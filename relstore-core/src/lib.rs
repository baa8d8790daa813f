//! Relational store over an embedded `SQLite` database.
//!
//! [`RdbStore`] is the entry point. It owns a [`ConnectionPool`] with one
//! write connection and a bounded set of read connections, coordinates
//! nested transactions on the writer, and hands out materialized or stepped
//! result sets. Encrypted stores take their key either from the caller or
//! from an [`RdbSecurityManager`]; mutations of cloud tables are coalesced
//! into debounced sync requests for an injected [`SyncBackend`].

mod error;
pub use error::*;

mod config;
pub use config::*;

pub mod logger;

pub mod sql_utils;
pub use sql_utils::{ConflictResolution, StatementType};

mod values_bucket;
pub use values_bucket::ValuesBucket;

mod predicates;
pub use predicates::RdbPredicates;

pub mod sql_builder;

pub mod connection;
pub use connection::{Attachment, SqliteConnection};

mod pool;
pub use pool::{ConnectionLease, ConnectionPool, PoolStats};

pub mod transaction;
pub use transaction::{BaseTransaction, TransType, TransactionCoordinator};

mod result_set;
pub use result_set::{ResultSet, SharedResultSet, StepResultSet};

pub mod security;
pub use security::{KeyFileType, RdbPassword, RdbSecurityManager, RootKeystore, SoftwareKeystore};

pub mod cloud_sync;
pub use cloud_sync::{
    CloudSyncDebouncer, DistributedConfig, NoopSyncBackend, RdbStoreObserver, StoreIdentity,
    SubscribeMode, SyncBackend, SyncDetails, SyncMode, SyncOption, Task, TaskExecutor,
    ThreadTaskExecutor,
};

mod store;
pub use store::{RdbStore, StoreServices};

pub use relstore_db::Value;
