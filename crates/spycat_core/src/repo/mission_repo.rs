//! Mission repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD primitives over the `missions` table.
//! - Resolve a cat's active mission and set or clear assignees.
//!
//! # Invariants
//! - Returned records never carry targets; callers attach them.
//! - A cat's active mission is the incomplete mission it is assigned to.
//!   The partial unique index `idx_missions_active_assignee` guarantees
//!   there is at most one.

use super::mappers::{parse_mission_row, MissionRecord, MISSION_COLUMNS};
use super::RepoResult;
use crate::model::cat::CatId;
use crate::model::mission::{MissionId, TargetId};
use rusqlite::{params, Connection, Params};

/// Repository interface for mission persistence.
pub trait MissionRepository {
    /// Inserts an unassigned, incomplete mission.
    fn create_mission(&self) -> RepoResult<MissionRecord>;
    fn list_missions(&self) -> RepoResult<Vec<MissionRecord>>;
    fn get_mission(&self, id: MissionId) -> RepoResult<Option<MissionRecord>>;
    /// Mission owning the given target.
    fn get_mission_by_target(&self, target_id: TargetId) -> RepoResult<Option<MissionRecord>>;
    /// Incomplete mission currently assigned to `cat_id`.
    fn get_active_cat_mission(&self, cat_id: CatId) -> RepoResult<Option<MissionRecord>>;
    /// Sets or clears the assignee. Returns `None` when no mission has `id`.
    fn set_assignee(
        &self,
        id: MissionId,
        assignee: Option<CatId>,
    ) -> RepoResult<Option<MissionRecord>>;
    /// Marks the mission completed. Returns `None` when no mission has `id`.
    fn complete_mission(&self, id: MissionId) -> RepoResult<Option<MissionRecord>>;
    /// Returns the number of deleted rows. Targets cascade.
    fn delete_mission(&self, id: MissionId) -> RepoResult<usize>;
}

/// SQLite-backed mission repository.
pub struct SqliteMissionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMissionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_one<P: Params>(&self, sql: &str, params: P) -> RepoResult<Option<MissionRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_mission_row(row)?)),
            None => Ok(None),
        }
    }
}

impl MissionRepository for SqliteMissionRepository<'_> {
    fn create_mission(&self) -> RepoResult<MissionRecord> {
        let created = self.query_one(
            &format!("INSERT INTO missions DEFAULT VALUES RETURNING {MISSION_COLUMNS};"),
            [],
        )?;
        created.ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    fn list_missions(&self) -> RepoResult<Vec<MissionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut missions = Vec::new();
        while let Some(row) = rows.next()? {
            missions.push(parse_mission_row(row)?);
        }
        Ok(missions)
    }

    fn get_mission(&self, id: MissionId) -> RepoResult<Option<MissionRecord>> {
        self.query_one(
            &format!("SELECT {MISSION_COLUMNS} FROM missions WHERE id = ?1;"),
            [id],
        )
    }

    fn get_mission_by_target(&self, target_id: TargetId) -> RepoResult<Option<MissionRecord>> {
        self.query_one(
            "SELECT m.id, m.assignee, m.completed
             FROM missions m
             INNER JOIN targets t ON t.mission_id = m.id
             WHERE t.id = ?1;",
            [target_id],
        )
    }

    fn get_active_cat_mission(&self, cat_id: CatId) -> RepoResult<Option<MissionRecord>> {
        self.query_one(
            &format!(
                "SELECT {MISSION_COLUMNS}
                 FROM missions
                 WHERE assignee = ?1
                   AND completed = 0;"
            ),
            [cat_id],
        )
    }

    fn set_assignee(
        &self,
        id: MissionId,
        assignee: Option<CatId>,
    ) -> RepoResult<Option<MissionRecord>> {
        self.query_one(
            &format!(
                "UPDATE missions
                 SET
                    assignee = ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                 RETURNING {MISSION_COLUMNS};"
            ),
            params![id, assignee],
        )
    }

    fn complete_mission(&self, id: MissionId) -> RepoResult<Option<MissionRecord>> {
        self.query_one(
            &format!(
                "UPDATE missions
                 SET
                    completed = 1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                 RETURNING {MISSION_COLUMNS};"
            ),
            [id],
        )
    }

    fn delete_mission(&self, id: MissionId) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM missions WHERE id = ?1;", [id])?;
        Ok(changed)
    }
}
