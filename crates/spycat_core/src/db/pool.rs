//! Fixed-size SQLite connection pool shared by service tasks.
//!
//! # Responsibility
//! - Own every connection used by the service layer.
//! - Lend connections to blocking storage work with a bounded wait.
//!
//! # Invariants
//! - All pooled connections point at the same database.
//! - A connection is used by at most one task at a time (mutex guard).
//! - In-memory pools hold exactly one connection; separate in-memory
//!   connections would be separate databases.

use super::open::{open_db, open_db_in_memory};
use super::{DbError, DbResult};
use log::info;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_POOL_SIZE: usize = 4;

struct DatabaseInner {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

/// Cloneable handle to the connection pool.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Opens `pool_size` migrated connections to the database file at `path`.
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> DbResult<Self> {
        if pool_size == 0 {
            return Err(DbError::InvalidPoolSize(pool_size));
        }
        let path = path.as_ref();
        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            connections.push(Mutex::new(open_db(path)?));
        }
        info!(
            "event=db_pool_open module=db status=ok mode=file pool_size={}",
            pool_size
        );
        Ok(Self::from_connections(connections))
    }

    /// Opens a single-connection pool over a fresh in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = open_db_in_memory()?;
        Ok(Self::from_connections(vec![Mutex::new(conn)]))
    }

    fn from_connections(connections: Vec<Mutex<Connection>>) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                connections,
                next: AtomicUsize::new(0),
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.inner.connections.len()
    }

    /// Locks a pooled connection, waiting no later than `deadline`.
    ///
    /// Returns `None` when no connection frees up in time.
    pub fn acquire_until(&self, deadline: Instant) -> Option<MutexGuard<'_, Connection>> {
        let connections = &self.inner.connections;
        let start = self.inner.next.fetch_add(1, Ordering::Relaxed) % connections.len();

        for offset in 0..connections.len() {
            let idx = (start + offset) % connections.len();
            if let Some(guard) = connections[idx].try_lock() {
                return Some(guard);
            }
        }

        connections[start].try_lock_until(deadline)
    }

    /// Rows changed through every pooled connection since it was opened.
    pub fn total_changes(&self) -> DbResult<i64> {
        let mut total = 0;
        for conn in &self.inner.connections {
            let guard = conn.lock();
            let changes: i64 = guard.query_row("SELECT total_changes();", [], |row| row.get(0))?;
            total += changes;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::db::DbError;
    use std::time::{Duration, Instant};

    #[test]
    fn zero_sized_pool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Database::open(dir.path().join("pool.db"), 0).err().unwrap();
        assert!(matches!(err, DbError::InvalidPoolSize(0)));
    }

    #[test]
    fn acquire_times_out_when_every_connection_is_busy() {
        let db = Database::open_in_memory().unwrap();
        let held = db.acquire_until(Instant::now()).unwrap();

        let started = Instant::now();
        let second = db.acquire_until(Instant::now() + Duration::from_millis(50));
        assert!(second.is_none());
        assert!(started.elapsed() >= Duration::from_millis(40));
        drop(held);

        assert!(db.acquire_until(Instant::now()).is_some());
    }

    #[test]
    fn file_pool_connections_share_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("shared.db"), 2).unwrap();
        assert_eq!(db.pool_size(), 2);

        let first = db.acquire_until(Instant::now()).unwrap();
        let second = db.acquire_until(Instant::now()).unwrap();
        first
            .execute(
                "INSERT INTO cats (name, breed, years_of_experience, salary) VALUES ('a', 'b', 1, 1);",
                [],
            )
            .unwrap();
        let count: i64 = second
            .query_row("SELECT COUNT(*) FROM cats;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
