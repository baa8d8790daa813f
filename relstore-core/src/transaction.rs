//! Nested transaction bookkeeping.
//!
//! Depth 0 is a real engine transaction (`BEGIN EXCLUSIVE`); every nested
//! level is a savepoint named after its depth. The coordinator only keeps the
//! stack; each [`BaseTransaction`] runs its own SQL on the write connection.

use crate::connection::SqliteConnection;
use crate::error::{RdbError, RdbResult};

/// What rolling back a nested level means for its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransType {
    /// Only this level is undone; the parent may still commit.
    #[default]
    RollbackSelf,
    /// The parent is marked failed and will roll back when committed.
    RollbackParent,
}

/// One level of the transaction stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTransaction {
    depth: usize,
    kind: TransType,
    child_failure: bool,
}

impl BaseTransaction {
    /// Level `depth` of the given kind.
    #[must_use]
    pub const fn new(depth: usize, kind: TransType) -> Self {
        Self {
            depth,
            kind,
            child_failure: false,
        }
    }

    /// Zero for the outermost level.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Rollback kind.
    #[must_use]
    pub const fn kind(&self) -> TransType {
        self.kind
    }

    /// Set when a nested `RollbackParent` level was rolled back.
    #[must_use]
    pub const fn child_failure(&self) -> bool {
        self.child_failure
    }

    fn savepoint(&self) -> String {
        format!("SP{}", self.depth)
    }

    /// SQL opening this level.
    #[must_use]
    pub fn begin_sql(&self) -> String {
        if self.depth == 0 {
            "BEGIN EXCLUSIVE;".to_string()
        } else {
            format!("SAVEPOINT {}", self.savepoint())
        }
    }

    /// SQL committing this level.
    #[must_use]
    pub fn commit_sql(&self) -> String {
        if self.depth == 0 {
            "COMMIT;".to_string()
        } else {
            format!("RELEASE SAVEPOINT {}", self.savepoint())
        }
    }

    /// SQL undoing this level.
    ///
    /// A savepoint rolled back to stays open, so it is released afterwards by
    /// [`commit_sql`](Self::commit_sql).
    #[must_use]
    pub fn rollback_sql(&self) -> String {
        if self.depth == 0 {
            "ROLLBACK;".to_string()
        } else {
            format!("ROLLBACK TO SAVEPOINT {}", self.savepoint())
        }
    }

    fn undo(&self, conn: &SqliteConnection) -> RdbResult<()> {
        if self.depth == 0 {
            // The engine may already have ended the transaction on error.
            if conn.raw().is_autocommit() {
                return Ok(());
            }
            return conn.execute_sql(&self.rollback_sql(), &[]);
        }
        conn.execute_sql(&self.rollback_sql(), &[])?;
        conn.execute_sql(&self.commit_sql(), &[])
    }

    /// Runs the SQL opening this level and flags the connection.
    ///
    /// # Errors
    ///
    /// The engine error of `BEGIN` or `SAVEPOINT`.
    pub fn open(&self, conn: &mut SqliteConnection) -> RdbResult<()> {
        conn.execute_sql(&self.begin_sql(), &[])?;
        conn.set_in_transaction(true);
        log::debug!("transaction level {} opened", self.depth);
        Ok(())
    }

    /// Runs the SQL committing this level.
    ///
    /// # Errors
    ///
    /// [`RdbError::ChildTransactionFailed`] when a nested level marked this
    /// one failed; the level is rolled back instead. A failed outermost
    /// `COMMIT` is followed by a best-effort `ROLLBACK` and its error is
    /// returned.
    pub fn commit(&self, conn: &SqliteConnection) -> RdbResult<()> {
        if self.child_failure {
            log::warn!(
                "transaction level {} has a failed child, rolling back",
                self.depth
            );
            self.undo(conn)?;
            return Err(RdbError::ChildTransactionFailed);
        }

        if let Err(err) = conn.execute_sql(&self.commit_sql(), &[]) {
            log::error!("commit of level {} failed: {err}", self.depth);
            if self.depth == 0 {
                if let Err(rollback) = self.undo(conn) {
                    log::error!("rollback after failed commit failed: {rollback}");
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Runs the SQL undoing this level.
    ///
    /// # Errors
    ///
    /// The engine error of the rollback.
    pub fn roll_back(&self, conn: &SqliteConnection) -> RdbResult<()> {
        let result = self.undo(conn);
        if let Err(err) = &result {
            log::error!("rollback of level {} failed: {err}", self.depth);
        }
        result
    }
}

/// Stack of open transaction levels for the store's write connection.
///
/// The stack only records levels. Callers run a level's SQL on the write
/// connection between [`next_level`](Self::next_level) and
/// [`push`](Self::push), or between [`top`](Self::top) and one of the pops,
/// so a lock around the coordinator is never held across an engine call.
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    stack: Vec<BaseTransaction>,
}

impl TransactionCoordinator {
    /// Number of open levels.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether no level is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Open levels, outermost first.
    #[must_use]
    pub fn levels(&self) -> &[BaseTransaction] {
        &self.stack
    }

    /// The level a begin of `kind` would open.
    #[must_use]
    pub fn next_level(&self, kind: TransType) -> BaseTransaction {
        BaseTransaction::new(self.stack.len(), kind)
    }

    /// Records an opened level.
    pub fn push(&mut self, level: BaseTransaction) {
        self.stack.push(level);
    }

    /// Copy of the innermost open level.
    #[must_use]
    pub fn top(&self) -> Option<BaseTransaction> {
        self.stack.last().cloned()
    }

    /// Drops the innermost level after its commit ran, whatever the outcome.
    pub fn pop_committed(&mut self) -> Option<BaseTransaction> {
        self.stack.pop()
    }

    /// Drops the innermost level after its rollback ran. A `RollbackParent`
    /// level marks its parent failed.
    pub fn pop_rolled_back(&mut self) -> Option<BaseTransaction> {
        let top = self.stack.pop()?;
        if top.kind != TransType::RollbackSelf {
            if let Some(parent) = self.stack.last_mut() {
                parent.child_failure = true;
            }
        }
        Some(top)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RdbStoreConfig;

    use super::*;

    fn writer() -> (tempfile::TempDir, SqliteConnection) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RdbStoreConfig::new(dir.path().join("tx.db"));
        let conn = SqliteConnection::open(&config, true, None, &[]).expect("open");
        conn.execute_sql("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .expect("create");
        (dir, conn)
    }

    fn count(conn: &SqliteConnection) -> i64 {
        conn.execute_get_long("SELECT count(*) FROM t", &[])
            .expect("count")
    }

    fn begin(coordinator: &mut TransactionCoordinator, conn: &mut SqliteConnection, kind: TransType) {
        let level = coordinator.next_level(kind);
        level.open(conn).expect("open level");
        coordinator.push(level);
    }

    fn settle(coordinator: &TransactionCoordinator, conn: &mut SqliteConnection) {
        if coordinator.is_empty() {
            conn.set_in_transaction(false);
        }
    }

    fn commit(coordinator: &mut TransactionCoordinator, conn: &mut SqliteConnection) -> RdbResult<()> {
        let Some(top) = coordinator.top() else {
            return Ok(());
        };
        let result = top.commit(conn);
        coordinator.pop_committed();
        settle(coordinator, conn);
        result
    }

    fn roll_back(coordinator: &mut TransactionCoordinator, conn: &mut SqliteConnection) -> RdbResult<()> {
        let top = coordinator.top().expect("open level");
        let result = top.roll_back(conn);
        coordinator.pop_rolled_back();
        settle(coordinator, conn);
        result
    }

    #[test]
    fn test_sql_text_by_depth() {
        let outer = BaseTransaction::new(0, TransType::RollbackSelf);
        assert_eq!(outer.begin_sql(), "BEGIN EXCLUSIVE;");
        assert_eq!(outer.commit_sql(), "COMMIT;");
        assert_eq!(outer.rollback_sql(), "ROLLBACK;");

        let nested = BaseTransaction::new(2, TransType::RollbackSelf);
        assert_eq!(nested.begin_sql(), "SAVEPOINT SP2");
        assert_eq!(nested.commit_sql(), "RELEASE SAVEPOINT SP2");
        assert_eq!(nested.rollback_sql(), "ROLLBACK TO SAVEPOINT SP2");
    }

    #[test]
    fn test_nested_commits_equal_flat_transaction() {
        let (_dir, mut conn) = writer();
        let mut coordinator = TransactionCoordinator::default();
        for id in 1..=3_i64 {
            begin(&mut coordinator, &mut conn, TransType::RollbackSelf);
            conn.execute_sql("INSERT INTO t (id) VALUES (?)", &[id.into()])
                .expect("insert");
        }
        assert_eq!(coordinator.depth(), 3);
        assert!(conn.is_in_transaction());
        for _ in 0..3 {
            commit(&mut coordinator, &mut conn).expect("commit");
        }
        assert!(coordinator.is_empty());
        assert!(!conn.is_in_transaction());
        assert!(conn.raw().is_autocommit());
        assert_eq!(count(&conn), 3);
    }

    #[test]
    fn test_inner_rollback_keeps_outer_writes() {
        let (_dir, mut conn) = writer();
        let mut coordinator = TransactionCoordinator::default();
        begin(&mut coordinator, &mut conn, TransType::RollbackSelf);
        conn.execute_sql("INSERT INTO t (id) VALUES (1)", &[])
            .expect("insert 1");
        begin(&mut coordinator, &mut conn, TransType::RollbackSelf);
        conn.execute_sql("INSERT INTO t (id) VALUES (2)", &[])
            .expect("insert 2");

        roll_back(&mut coordinator, &mut conn).expect("rollback inner");
        assert!(conn.is_in_transaction());
        assert!(!coordinator.levels()[0].child_failure());
        commit(&mut coordinator, &mut conn).expect("commit outer");
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_rollback_parent_fails_enclosing_commit() {
        let (_dir, mut conn) = writer();
        let mut coordinator = TransactionCoordinator::default();
        begin(&mut coordinator, &mut conn, TransType::RollbackSelf);
        conn.execute_sql("INSERT INTO t (id) VALUES (1)", &[])
            .expect("insert");
        begin(&mut coordinator, &mut conn, TransType::RollbackParent);
        roll_back(&mut coordinator, &mut conn).expect("rollback inner");
        assert!(coordinator.levels()[0].child_failure());

        match commit(&mut coordinator, &mut conn) {
            Err(RdbError::ChildTransactionFailed) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(coordinator.is_empty());
        assert!(!conn.is_in_transaction());
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_empty_stack() {
        let (_dir, mut conn) = writer();
        let mut coordinator = TransactionCoordinator::default();
        commit(&mut coordinator, &mut conn).expect("empty commit");
        assert!(coordinator.top().is_none());
        assert!(coordinator.pop_rolled_back().is_none());
        assert_eq!(coordinator.next_level(TransType::RollbackSelf).depth(), 0);
    }

    #[test]
    fn test_failed_outer_commit_rolls_back() {
        let (_dir, mut conn) = writer();
        conn.execute_sql("PRAGMA foreign_keys = ON", &[])
            .expect("foreign keys");
        conn.execute_sql(
            "CREATE TABLE c (pid INTEGER REFERENCES t(id) DEFERRABLE INITIALLY DEFERRED)",
            &[],
        )
        .expect("create child");
        let mut coordinator = TransactionCoordinator::default();
        begin(&mut coordinator, &mut conn, TransType::RollbackSelf);
        conn.execute_sql("INSERT INTO c (pid) VALUES (99)", &[])
            .expect("orphan insert");

        match commit(&mut coordinator, &mut conn) {
            Err(RdbError::Sqlite(err)) => {
                assert_eq!(err.code.primary(), relstore_db::codes::SQLITE_CONSTRAINT);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(coordinator.is_empty());
        assert!(!conn.is_in_transaction());
        assert!(conn.raw().is_autocommit());
        assert_eq!(
            conn.execute_get_long("SELECT count(*) FROM c", &[])
                .expect("count"),
            0
        );
    }
}
