//! Pooled SQLite store shared by every component.
//!
//! The handle is constructed once at startup, migrated before the gateway
//! binds its listener, and cloned into each store that needs it. Writes are
//! serialised by SQLite's own page lock + busy_timeout; WAL mode lets reads
//! parallelise across the pool.

pub mod migrations;

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

/// Maximum connections held by the pool.
const POOL_MAX_CONNECTIONS: u32 = 8;

/// A connection checked out of the pool.
pub type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Cloneable handle to the application database.
#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
}

impl Store {
    /// Open (or create) the database at the given path.
    ///
    /// Every pooled connection runs the same init batch: WAL journal,
    /// relaxed fsync, foreign keys on, and a busy timeout so concurrent
    /// writers queue instead of failing.
    pub fn open(db_path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        });

        let pool = Pool::builder()
            .max_size(POOL_MAX_CONNECTIONS)
            .build(manager)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;

        Ok(Self { pool })
    }

    /// Check a connection out of the pool.
    pub fn conn(&self) -> Result<PooledConn> {
        self.pool.get().context("no database connection available")
    }

    /// Walk the schema migration graph to the terminal version.
    ///
    /// Runs on a single pooled connection inside one transaction; must
    /// complete before any other component touches the store. Returns the
    /// number of steps applied (zero when already at the terminal version).
    pub fn migrate(&self) -> Result<usize> {
        let mut conn = self.conn()?;
        let applied = migrations::migrate(&mut conn)?;
        Ok(applied)
    }
}
