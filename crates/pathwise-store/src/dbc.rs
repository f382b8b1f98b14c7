//! Database context passed into every repo call.
//!
//! A [`Dbc`] always carries an executor: either the pool (one pooled
//! connection per statement) or an open transaction's connection. Repos have
//! a single code path, [`Dbc::exec`], and never branch on which one it is.
//!
//! The context also carries a [`CancellationToken`] and an optional
//! deadline. Both are checked before every statement and installed as a
//! `SQLite` progress handler while the statement runs, so cancellation
//! interrupts work already in flight.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{ConnectionPool, PooledConnection};

/// VM instructions between cancellation polls.
const PROGRESS_OPS: i32 = 1000;

#[derive(Clone, Copy)]
enum Executor<'a> {
    Pool(&'a ConnectionPool),
    Tx(&'a Connection),
}

/// Database context: executor plus cancellation scope.
#[derive(Clone)]
pub struct Dbc<'a> {
    exec: Executor<'a>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl fmt::Debug for Dbc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dbc")
            .field("in_transaction", &self.in_transaction())
            .field("canceled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl<'a> Dbc<'a> {
    pub(crate) fn from_pool(pool: &'a ConnectionPool) -> Self {
        Self {
            exec: Executor::Pool(pool),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Same cancellation scope, bound to a transaction connection.
    pub(crate) fn bind<'b>(&self, conn: &'b Connection) -> Dbc<'b> {
        Dbc {
            exec: Executor::Tx(conn),
            cancel: self.cancel.clone(),
            deadline: self.deadline,
        }
    }

    /// Replace the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Add a deadline. The earlier of the existing and new deadline wins.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Add a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// The cancellation token carried by this context.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether statements run inside an open transaction.
    pub fn in_transaction(&self) -> bool {
        matches!(self.exec, Executor::Tx(_))
    }

    /// Whether the token was canceled or the deadline passed.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Canceled)` once the context is canceled.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(StoreError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Run `f` against this context's executor.
    pub(crate) fn exec<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.check()?;
        match self.exec {
            Executor::Tx(conn) => self.run(conn, f),
            Executor::Pool(pool) => {
                let conn = self.acquire(pool)?;
                self.run(&conn, f)
            }
        }
    }

    /// Check out a pooled connection, waiting no longer than the deadline.
    pub(crate) fn acquire(&self, pool: &ConnectionPool) -> Result<PooledConnection> {
        self.check()?;
        let wait = match self.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(pool.connection_timeout()),
            None => pool.connection_timeout(),
        };
        pool.get_timeout(wait).map_err(|e| {
            if self.is_canceled() {
                StoreError::Canceled
            } else {
                e.into()
            }
        })
    }

    fn run<T>(&self, conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _interrupt = InterruptGuard::install(conn, &self.cancel, self.deadline);
        f(conn)
    }
}

/// Progress handler that interrupts the running statement on cancellation.
/// Removed on drop so pooled connections go back clean.
struct InterruptGuard<'c> {
    conn: &'c Connection,
}

impl<'c> InterruptGuard<'c> {
    fn install(conn: &'c Connection, cancel: &CancellationToken, deadline: Option<Instant>) -> Self {
        let token = AssertUnwindSafe(cancel.clone());
        conn.progress_handler(
            PROGRESS_OPS,
            Some(move || {
                token.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d)
            }),
        );
        Self { conn }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);
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
    use crate::sqlite::connection::new_pool;
    use pathwise_settings::StoreSettings;

    fn pool() -> ConnectionPool {
        new_pool(&StoreSettings::in_memory()).unwrap()
    }

    #[test]
    fn pool_context_runs_statements() {
        let pool = pool();
        let dbc = Dbc::from_pool(&pool);
        assert!(!dbc.in_transaction());
        let n: i64 = dbc
            .exec(|conn| Ok(conn.query_row("SELECT 41 + 1", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(n, 42);
    }

    #[test]
    fn canceled_token_short_circuits() {
        let pool = pool();
        let token = CancellationToken::new();
        let dbc = Dbc::from_pool(&pool).with_cancel(token.clone());
        token.cancel();
        let err = dbc.exec(|_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
    }

    #[test]
    fn expired_deadline_short_circuits() {
        let pool = pool();
        let dbc = Dbc::from_pool(&pool).with_deadline(Instant::now());
        assert!(dbc.is_canceled());
        assert_eq!(dbc.check().unwrap_err().kind(), ErrorKind::Canceled);
    }

    #[test]
    fn earlier_deadline_wins() {
        let pool = pool();
        let soon = Instant::now() + Duration::from_secs(1);
        let later = soon + Duration::from_secs(60);
        let dbc = Dbc::from_pool(&pool).with_deadline(soon).with_deadline(later);
        assert_eq!(dbc.deadline(), Some(soon));
    }

    #[test]
    fn cancellation_interrupts_running_statement() {
        let pool = pool();
        let token = CancellationToken::new();
        let dbc = Dbc::from_pool(&pool).with_cancel(token.clone());
        let err = dbc
            .exec(|conn| {
                // Cancel from inside the executor: the pre-statement check has
                // already passed, so only the progress handler can stop it.
                token.cancel();
                let n: i64 = conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 10000000)
                     SELECT COUNT(*) FROM c",
                    [],
                    |r| r.get(0),
                )?;
                Ok(n)
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);

        // The handler is removed afterwards; a fresh context works.
        let ok: i64 = Dbc::from_pool(&pool)
            .exec(|conn| Ok(conn.query_row("SELECT 1", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(ok, 1);
    }

    #[test]
    fn bound_context_shares_scope() {
        let pool = pool();
        let conn = pool.get().unwrap();
        let token = CancellationToken::new();
        let outer = Dbc::from_pool(&pool).with_cancel(token.clone());
        let inner = outer.bind(&conn);
        assert!(inner.in_transaction());
        token.cancel();
        assert!(inner.is_canceled());
    }
}
