//! Transaction runner.
//!
//! [`Store::transact`] opens a transaction on one pooled connection, hands
//! the callback a [`Dbc`] bound to it, and commits when the callback
//! succeeds. It rolls back when the callback fails, when the context was
//! canceled before commit, and on panic (the transaction's drop rolls back).
//! A context that already carries a transaction is reused as-is.

use pathwise_settings::Isolation;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::dbc::Dbc;
use crate::errors::{Result, StoreError};
use crate::store::Store;

/// Options for [`Store::transact`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Requested isolation.
    pub isolation: Isolation,
    /// Reject writes for the duration of the transaction.
    pub read_only: bool,
}

impl TxOptions {
    /// Serializable read-write transaction (write lock taken at `BEGIN`).
    pub fn serializable() -> Self {
        Self {
            isolation: Isolation::Serializable,
            read_only: false,
        }
    }

    /// Read-only transaction.
    pub fn read_only() -> Self {
        Self {
            isolation: Isolation::ReadCommitted,
            read_only: true,
        }
    }

    fn behavior(self) -> TransactionBehavior {
        // SQLite transactions are always serializable. The isolation level
        // only decides when the write lock is taken.
        match self.isolation {
            Isolation::Serializable if !self.read_only => TransactionBehavior::Immediate,
            _ => TransactionBehavior::Deferred,
        }
    }
}

impl Store {
    /// Run `f` inside a transaction.
    pub fn transact<T, F>(&self, dbc: &Dbc<'_>, opts: TxOptions, f: F) -> Result<T>
    where
        F: FnOnce(&Dbc<'_>) -> Result<T>,
    {
        if dbc.in_transaction() {
            return f(dbc);
        }

        let conn = dbc.acquire(self.pool())?;
        let _query_only = QueryOnlyGuard::set(&conn, opts.read_only)?;
        let tx = Transaction::new_unchecked(&conn, opts.behavior())?;
        debug!(isolation = ?opts.isolation, read_only = opts.read_only, "transaction begin");

        let result = {
            let inner = dbc.bind(&tx);
            f(&inner)
        };

        match result {
            Ok(value) if !dbc.is_canceled() => {
                tx.commit()?;
                debug!("transaction committed");
                Ok(value)
            }
            Ok(_) => {
                rollback(tx);
                Err(StoreError::Canceled)
            }
            Err(err) => {
                rollback(tx);
                Err(err)
            }
        }
    }
}

fn rollback(tx: Transaction<'_>) {
    // An interrupted write may already have rolled the transaction back.
    match tx.rollback() {
        Ok(()) => debug!("transaction rolled back"),
        Err(err) => warn!(error = %err, "rollback failed"),
    }
}

/// Holds `PRAGMA query_only` on for a read-only transaction.
struct QueryOnlyGuard<'c> {
    conn: Option<&'c Connection>,
}

impl<'c> QueryOnlyGuard<'c> {
    fn set(conn: &'c Connection, enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self { conn: None });
        }
        conn.execute_batch("PRAGMA query_only = ON")?;
        Ok(Self { conn: Some(conn) })
    }
}

impl Drop for QueryOnlyGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn {
            if let Err(err) = conn.execute_batch("PRAGMA query_only = OFF") {
                warn!(error = %err, "failed to reset query_only");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use tokio_util::sync::CancellationToken;

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .dbc()
            .exec(|conn| Ok(conn.execute_batch("CREATE TABLE probe (n INTEGER NOT NULL)")?))
            .unwrap();
        store
    }

    fn count(store: &Store) -> i64 {
        store
            .dbc()
            .exec(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM probe", [], |r| r.get(0))?))
            .unwrap()
    }

    fn insert(dbc: &Dbc<'_>) -> Result<()> {
        dbc.exec(|conn| {
            conn.execute("INSERT INTO probe (n) VALUES (1)", [])?;
            Ok(())
        })
    }

    #[test]
    fn commit_on_success() {
        let store = store();
        let dbc = store.dbc();
        store
            .transact(&dbc, TxOptions::default(), |tx| {
                assert!(tx.in_transaction());
                insert(tx)
            })
            .unwrap();
        assert_eq!(count(&store), 1);
    }

    #[test]
    fn rollback_on_error() {
        let store = store();
        let dbc = store.dbc();
        let err = store
            .transact(&dbc, TxOptions::default(), |tx| {
                insert(tx)?;
                Err::<(), _>(StoreError::InvalidArgument("forced".into()))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(count(&store), 0);
    }

    #[test]
    fn rollback_when_canceled_before_commit() {
        let store = store();
        let token = CancellationToken::new();
        let dbc = store.dbc().with_cancel(token.clone());
        let err = store
            .transact(&dbc, TxOptions::default(), |tx| {
                insert(tx)?;
                token.cancel();
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
        assert_eq!(count(&store), 0);
    }

    #[test]
    fn rollback_on_panic() {
        let store = store();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let dbc = store.dbc();
            let _ = store.transact(&dbc, TxOptions::default(), |tx| -> Result<()> {
                insert(tx)?;
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(count(&store), 0);
    }

    #[test]
    fn nested_transactions_reuse_outer() {
        let store = store();
        let dbc = store.dbc();
        let err = store
            .transact(&dbc, TxOptions::default(), |outer| {
                store.transact(outer, TxOptions::serializable(), insert)?;
                Err::<(), _>(StoreError::InvalidArgument("outer fails".into()))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(count(&store), 0);
    }

    #[test]
    fn read_only_rejects_writes_and_resets() {
        let store = store();
        let dbc = store.dbc();
        let err = store
            .transact(&dbc, TxOptions::read_only(), insert)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Driver);

        store
            .transact(&dbc, TxOptions::serializable(), insert)
            .unwrap();
        assert_eq!(count(&store), 1);
    }

    #[test]
    fn behavior_mapping() {
        assert!(matches!(
            TxOptions::serializable().behavior(),
            TransactionBehavior::Immediate
        ));
        assert!(matches!(
            TxOptions::default().behavior(),
            TransactionBehavior::Deferred
        ));
        let ro_serializable = TxOptions {
            isolation: Isolation::Serializable,
            read_only: true,
        };
        assert!(matches!(
            ro_serializable.behavior(),
            TransactionBehavior::Deferred
        ));
    }
}
