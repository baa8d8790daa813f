use std::thread;
use std::time::Duration;

use super::RdbStore;
use crate::connection::SqliteConnection;
use crate::error::{RdbError, RdbResult};
use crate::transaction::{BaseTransaction, TransType, TransactionCoordinator};

impl RdbStore {
    /// Opens a transaction, or a nested savepoint when the calling thread
    /// already has one open.
    ///
    /// # Errors
    ///
    /// [`RdbError::TransactionInExecute`] when another thread keeps its
    /// transaction open for the whole acquisition timeout.
    pub fn begin_transaction(&self) -> RdbResult<()> {
        self.begin_transaction_with_kind(TransType::RollbackSelf)
    }

    /// Like [`begin_transaction`](Self::begin_transaction), choosing what a
    /// rollback of this level means for the enclosing one.
    pub fn begin_transaction_with_kind(&self, kind: TransType) -> RdbResult<()> {
        self.check_writable()?;
        let newly_owned = self.pool.acquire_transaction()?;

        // The stack lock is taken twice around the engine call, never across it.
        let begun = self.pool.acquire_write().and_then(|mut lease| {
            let level = self.lock_transactions()?.next_level(kind);
            level.open(&mut lease)?;
            self.lock_transactions()?.push(level);
            Ok(())
        });
        if let Err(err) = begun {
            if newly_owned && self.lock_transactions().map_or(true, |c| c.is_empty()) {
                self.pool.release_transaction();
            }
            return Err(err);
        }
        Ok(())
    }

    /// Fails unless the calling thread owns the open transaction. `Ok(false)`
    /// means no transaction is open at all.
    fn check_transaction_owner(&self) -> RdbResult<bool> {
        match self.pool.transaction_owner()? {
            None => Ok(false),
            Some(owner) if owner == thread::current().id() => Ok(true),
            Some(_) => Err(RdbError::TransactionInExecute),
        }
    }

    /// Commits the innermost open level. Without an open transaction this
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// [`RdbError::TransactionInExecute`] from a thread that does not own the
    /// transaction, [`RdbError::ChildTransactionFailed`] when a nested level
    /// asked for this one to fail, or the engine error of the commit. The
    /// level is closed in every case.
    pub fn commit(&self) -> RdbResult<()> {
        if !self.check_transaction_owner()? {
            return Ok(());
        }
        self.settle_level(BaseTransaction::commit, TransactionCoordinator::pop_committed)
    }

    /// Rolls back the innermost open level.
    ///
    /// # Errors
    ///
    /// [`RdbError::NoTransactionInSession`] without an open transaction,
    /// [`RdbError::TransactionInExecute`] from a thread that does not own it.
    pub fn roll_back(&self) -> RdbResult<()> {
        if !self.check_transaction_owner()? {
            return Err(RdbError::NoTransactionInSession);
        }
        self.settle_level(BaseTransaction::roll_back, TransactionCoordinator::pop_rolled_back)
    }

    fn settle_level(
        &self,
        run: fn(&BaseTransaction, &SqliteConnection) -> RdbResult<()>,
        pop: fn(&mut TransactionCoordinator) -> Option<BaseTransaction>,
    ) -> RdbResult<()> {
        let (result, closed) = {
            let mut lease = self.pool.acquire_write()?;
            let Some(top) = self.lock_transactions()?.top() else {
                return Ok(());
            };
            let result = run(&top, &*lease);
            let closed = {
                let mut coordinator = self.lock_transactions()?;
                pop(&mut coordinator);
                coordinator.is_empty()
            };
            if closed {
                lease.set_in_transaction(false);
            }
            (result, closed)
        };
        if closed {
            self.pool.release_transaction();
        }
        result
    }

    /// Whether a transaction is open on this store.
    pub fn is_in_transaction(&self) -> RdbResult<bool> {
        Ok(!self.lock_transactions()?.is_empty())
    }

    /// Holds the write lock for `duration`, then releases it without
    /// changing anything.
    ///
    /// # Errors
    ///
    /// [`RdbError::StoreSessionNotGiveConnectionTemporarily`] while a
    /// transaction is open.
    pub fn give_connection_temporarily(&self, duration: Duration) -> RdbResult<()> {
        if self.is_in_transaction()? {
            return Err(RdbError::StoreSessionNotGiveConnectionTemporarily);
        }
        self.begin_transaction()?;
        thread::sleep(duration);
        self.roll_back()
    }
}
