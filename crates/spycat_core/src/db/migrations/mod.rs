//! Schema migrations for the cats/missions/targets store.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Bring a database from any older version to the latest in one
//!   transaction.
//!
//! # Invariants
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - `0002` adds the partial unique index backing cat exclusivity, so it
//!   must run after the tables exist.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "init",
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        name: "active_assignee",
        sql: include_str!("0002_active_assignee.sql"),
    },
];

/// Latest schema version this build can open.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies every migration newer than the stored `user_version`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer build.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    migrate_to(conn, latest_version())
}

fn migrate_to(conn: &mut Connection, target: u32) -> DbResult<()> {
    let from = current_user_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from && migration.version <= target)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        debug!(
            "event=db_migrate_step module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={} applied={}",
        from,
        target,
        pending.len()
    );
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
