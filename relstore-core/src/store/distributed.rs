use std::sync::Arc;

use super::RdbStore;
use crate::cloud_sync::{DistributedConfig, RdbStoreObserver, SubscribeMode, SyncDetails, SyncOption};
use crate::config::DistributedType;
use crate::error::RdbResult;

impl RdbStore {
    /// Registers `tables` with the sync service. Cloud tables with
    /// `auto_sync` are synced automatically after local mutations.
    pub fn set_distributed_tables(
        &self,
        tables: &[String],
        kind: DistributedType,
        config: &DistributedConfig,
    ) -> RdbResult<()> {
        self.sync_backend
            .set_distributed_tables(&self.identity, tables, kind, config)?;
        if kind == DistributedType::Cloud && config.auto_sync {
            self.debouncer.set_cloud_tables(tables.iter().cloned());
        }
        Ok(())
    }

    /// Syncs `tables` now (every distributed table when empty).
    pub fn sync(&self, option: &SyncOption, tables: &[String]) -> RdbResult<SyncDetails> {
        self.sync_backend.sync(&self.identity, option, tables)
    }

    /// Forwards remote or cloud changes of this store to `observer`.
    pub fn subscribe(&self, mode: SubscribeMode, observer: Arc<dyn RdbStoreObserver>) -> RdbResult<()> {
        self.sync_backend.subscribe(&self.identity, mode, observer)
    }

    /// Stops forwarding changes to `observer`.
    pub fn unsubscribe(&self, mode: SubscribeMode, observer: &Arc<dyn RdbStoreObserver>) -> RdbResult<()> {
        self.sync_backend.unsubscribe(&self.identity, mode, observer)
    }

    /// Schedules a debounced cloud sync of `table`, or of every cloud table
    /// when `table` is empty. Never fails; scheduling problems are logged.
    pub fn do_cloud_sync(&self, table: &str) {
        self.debouncer.do_cloud_sync(table);
    }
}
