//! Row-to-domain translation.
//!
//! Pure functions: no queries, no business rules. Every repository maps
//! rows through here so column naming lives in one place.

use super::{RepoError, RepoResult};
use crate::model::cat::{Cat, CatId};
use crate::model::mission::{Mission, MissionId, Target};
use rusqlite::Row;

pub(crate) const CAT_COLUMNS: &str = "id, name, breed, years_of_experience, salary";
pub(crate) const MISSION_COLUMNS: &str = "id, assignee, completed";
pub(crate) const TARGET_COLUMNS: &str = "id, mission_id, name, country, notes, completed";

/// Mission row without its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionRecord {
    pub id: MissionId,
    pub assignee: Option<CatId>,
    pub completed: bool,
}

impl MissionRecord {
    /// Attaches the mission's targets.
    pub fn into_mission(self, targets: Vec<Target>) -> Mission {
        Mission {
            id: self.id,
            assignee: self.assignee,
            targets,
            completed: self.completed,
        }
    }
}

pub(crate) fn parse_cat_row(row: &Row<'_>) -> RepoResult<Cat> {
    Ok(Cat {
        id: row.get("id")?,
        name: row.get("name")?,
        breed: row.get("breed")?,
        years_of_experience: row.get("years_of_experience")?,
        salary: row.get("salary")?,
    })
}

pub(crate) fn parse_mission_row(row: &Row<'_>) -> RepoResult<MissionRecord> {
    Ok(MissionRecord {
        id: row.get("id")?,
        assignee: row.get("assignee")?,
        completed: parse_flag(row.get("completed")?, "missions.completed")?,
    })
}

pub(crate) fn parse_target_row(row: &Row<'_>) -> RepoResult<Target> {
    Ok(Target {
        id: row.get("id")?,
        mission_id: row.get("mission_id")?,
        name: row.get("name")?,
        country: row.get("country")?,
        notes: row.get("notes")?,
        completed: parse_flag(row.get("completed")?, "targets.completed")?,
    })
}

fn parse_flag(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}
