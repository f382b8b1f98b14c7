//! Store handle: the long-lived pool plus the clock every write reads.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pathwise_settings::{Isolation, StoreSettings};
use tracing::info;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::sqlite::connection::{self, ConnectionPool};
use crate::sqlite::migrations;
use crate::time::{Clock, SystemClock};
use crate::tx::TxOptions;

/// Shared handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
    clock: Arc<dyn Clock>,
    statement_timeout: Option<Duration>,
    default_isolation: Isolation,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("pool_size", &self.pool.max_size())
            .field("clock", &self.clock)
            .field("statement_timeout", &self.statement_timeout)
            .field("default_isolation", &self.default_isolation)
            .finish()
    }
}

impl Store {
    /// Open the configured database and apply pending migrations.
    pub fn open(settings: &StoreSettings) -> Result<Self> {
        let pool = connection::new_pool(settings)?;
        let applied = {
            let conn = pool.get()?;
            migrations::run_migrations(&conn)?
        };
        info!(
            path = %settings.database_path,
            pool_size = settings.pool_size,
            migrations_applied = applied,
            "store opened"
        );

        let mut store = Self::from_pool(pool);
        store.statement_timeout = settings.statement_timeout_ms.map(Duration::from_millis);
        store.default_isolation = settings.default_isolation;
        Ok(store)
    }

    /// Open a private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreSettings::in_memory())
    }

    /// Wrap an existing pool. Migrations are not run.
    pub fn from_pool(pool: ConnectionPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            statement_timeout: None,
            default_isolation: Isolation::default(),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current instant according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Fresh pool-bound context with the configured statement timeout.
    pub fn dbc(&self) -> Dbc<'_> {
        let dbc = Dbc::from_pool(&self.pool);
        match self.statement_timeout {
            Some(timeout) => dbc.with_timeout(timeout),
            None => dbc,
        }
    }

    /// Read-write options at the configured default isolation.
    pub fn tx_options(&self) -> TxOptions {
        TxOptions {
            isolation: self.default_isolation,
            read_only: false,
        }
    }
}
