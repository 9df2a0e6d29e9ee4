//! Target repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD primitives over the `targets` table.
//!
//! # Invariants
//! - Targets are listed in creation order (`id ASC`).
//! - `complete_target` is idempotent; there is no way back to incomplete.

use super::mappers::{parse_target_row, TARGET_COLUMNS};
use super::RepoResult;
use crate::model::mission::{MissionId, NewTarget, Target, TargetId};
use rusqlite::{params, Connection, Params};

/// Repository interface for target persistence.
pub trait TargetRepository {
    fn get_target(&self, id: TargetId) -> RepoResult<Option<Target>>;
    fn list_mission_targets(&self, mission_id: MissionId) -> RepoResult<Vec<Target>>;
    /// Every target, ordered by `(mission_id, id)`.
    fn list_all_targets(&self) -> RepoResult<Vec<Target>>;
    fn count_mission_targets(&self, mission_id: MissionId) -> RepoResult<usize>;
    fn create_target(&self, mission_id: MissionId, target: &NewTarget) -> RepoResult<Target>;
    /// Returns `None` when no target has `id`.
    fn update_target_notes(&self, id: TargetId, notes: &str) -> RepoResult<Option<Target>>;
    /// Returns `None` when no target has `id`.
    fn complete_target(&self, id: TargetId) -> RepoResult<Option<Target>>;
    /// Returns the number of deleted rows.
    fn delete_target(&self, id: TargetId) -> RepoResult<usize>;
}

/// SQLite-backed target repository.
pub struct SqliteTargetRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTargetRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_one<P: Params>(&self, sql: &str, params: P) -> RepoResult<Option<Target>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_target_row(row)?)),
            None => Ok(None),
        }
    }
}

impl TargetRepository for SqliteTargetRepository<'_> {
    fn get_target(&self, id: TargetId) -> RepoResult<Option<Target>> {
        self.query_one(
            &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?1;"),
            [id],
        )
    }

    fn list_mission_targets(&self, mission_id: MissionId) -> RepoResult<Vec<Target>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TARGET_COLUMNS}
             FROM targets
             WHERE mission_id = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([mission_id])?;
        let mut targets = Vec::new();
        while let Some(row) = rows.next()? {
            targets.push(parse_target_row(row)?);
        }
        Ok(targets)
    }

    fn list_all_targets(&self) -> RepoResult<Vec<Target>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TARGET_COLUMNS}
             FROM targets
             ORDER BY mission_id ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut targets = Vec::new();
        while let Some(row) = rows.next()? {
            targets.push(parse_target_row(row)?);
        }
        Ok(targets)
    }

    fn count_mission_targets(&self, mission_id: MissionId) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM targets WHERE mission_id = ?1;",
            [mission_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn create_target(&self, mission_id: MissionId, target: &NewTarget) -> RepoResult<Target> {
        let created = self.query_one(
            &format!(
                "INSERT INTO targets (mission_id, name, country, notes)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING {TARGET_COLUMNS};"
            ),
            params![
                mission_id,
                target.name.as_str(),
                target.country.as_str(),
                target.notes.as_str(),
            ],
        )?;
        created.ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    fn update_target_notes(&self, id: TargetId, notes: &str) -> RepoResult<Option<Target>> {
        self.query_one(
            &format!(
                "UPDATE targets
                 SET
                    notes = ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                 RETURNING {TARGET_COLUMNS};"
            ),
            params![id, notes],
        )
    }

    fn complete_target(&self, id: TargetId) -> RepoResult<Option<Target>> {
        self.query_one(
            &format!(
                "UPDATE targets
                 SET
                    completed = 1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                 RETURNING {TARGET_COLUMNS};"
            ),
            [id],
        )
    }

    fn delete_target(&self, id: TargetId) -> RepoResult<usize> {
        let changed = self.conn.execute("DELETE FROM targets WHERE id = ?1;", [id])?;
        Ok(changed)
    }
}
