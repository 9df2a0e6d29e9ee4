//! Target use-case service.
//!
//! # Responsibility
//! - Add targets to missions up to the per-mission limit.
//! - Update notes, complete and delete targets under their state guards.
//!
//! # Invariants
//! - The capacity check and the insert share one immediate transaction, so
//!   concurrent adds never push a mission past three targets.
//! - Notes of a completed target, or of any target on a completed mission,
//!   never change.

use super::context::CallContext;
use super::error::{Entity, ServiceError, ServiceResult, ValidationError};
use super::mission_service::{load_mission, require_mission};
use super::timeout::{OperationClass, OperationScope, TimeoutPolicy};
use crate::db::Database;
use crate::model::mission::{validate_notes, Mission, MissionId, NewTarget, Target, TargetId, MAX_TARGETS};
use crate::repo::mission_repo::{MissionRepository, SqliteMissionRepository};
use crate::repo::target_repo::{SqliteTargetRepository, TargetRepository};
use rusqlite::Connection;

const MODULE: &str = "target_service";

/// Target service facade over the connection pool.
#[derive(Clone)]
pub struct TargetService {
    db: Database,
    policy: TimeoutPolicy,
}

impl TargetService {
    pub fn new(db: Database, policy: TimeoutPolicy) -> Self {
        Self { db, policy }
    }

    fn scope(&self, ctx: &CallContext, op: &'static str, class: OperationClass) -> OperationScope {
        OperationScope::new(&self.policy, ctx, MODULE, op, class)
    }

    /// Appends a target to an incomplete mission and returns the mission.
    ///
    /// # Errors
    /// - `NotFound(Mission)` when the mission does not exist.
    /// - `Validation(CapacityExceeded)` when it already holds three targets.
    /// - `Validation(MissionCompleted)` when it is completed.
    pub async fn add_target(
        &self,
        ctx: &CallContext,
        mission_id: MissionId,
        target: NewTarget,
    ) -> ServiceResult<Mission> {
        let scope = self
            .scope(ctx, "add_target", OperationClass::Transactional)
            .field("mission_id", mission_id);
        scope
            .run(async {
                target.validate()?;
                scope
                    .transaction(&self.db, "failed to add target", move |tx| {
                        let context = "failed to add target";
                        let record = require_mission(tx, mission_id, context)?;
                        if record.completed {
                            return Err(ValidationError::MissionCompleted(mission_id).into());
                        }
                        let targets = SqliteTargetRepository::new(tx);
                        let count = targets
                            .count_mission_targets(mission_id)
                            .map_err(|err| ServiceError::storage(context, err))?;
                        if count >= MAX_TARGETS {
                            return Err(ValidationError::CapacityExceeded(mission_id).into());
                        }
                        targets
                            .create_target(mission_id, &target)
                            .map_err(|err| ServiceError::storage(context, err))?;
                        load_mission(tx, mission_id, context)
                    })
                    .await
            })
            .await
    }

    /// Replaces a target's notes.
    ///
    /// # Errors
    /// - `Validation` for empty or over-long notes, a completed target or a
    ///   completed mission.
    /// - `NotFound(Target)` when the target does not exist.
    pub async fn update_notes(
        &self,
        ctx: &CallContext,
        target_id: TargetId,
        notes: String,
    ) -> ServiceResult<Target> {
        let scope = self
            .scope(ctx, "update_notes", OperationClass::SingleEntity)
            .field("target_id", target_id);
        scope
            .run(async {
                validate_notes(&notes)?;
                scope
                    .transaction(&self.db, "failed to update notes", move |tx| {
                        let context = "failed to update notes";
                        let current = require_target(tx, target_id, context)?;
                        if current.completed {
                            return Err(ValidationError::TargetCompleted(target_id).into());
                        }
                        ensure_mission_open(tx, target_id, context)?;

                        SqliteTargetRepository::new(tx)
                            .update_target_notes(target_id, &notes)
                            .map_err(|err| ServiceError::storage(context, err))?
                            .ok_or(ServiceError::NotFound(Entity::Target(target_id)))
                    })
                    .await
            })
            .await
    }

    /// Marks a target completed. Completing twice is a no-op.
    pub async fn complete_target(
        &self,
        ctx: &CallContext,
        target_id: TargetId,
    ) -> ServiceResult<Target> {
        let scope = self
            .scope(ctx, "complete_target", OperationClass::SingleEntity)
            .field("target_id", target_id);
        scope
            .run(scope.storage(&self.db, "failed to complete target", move |conn| {
                SqliteTargetRepository::new(conn)
                    .complete_target(target_id)
                    .map_err(|err| ServiceError::storage("failed to complete target", err))?
                    .ok_or(ServiceError::NotFound(Entity::Target(target_id)))
            }))
            .await
    }

    /// Removes a target from a mission that is not completed.
    pub async fn delete_target(&self, ctx: &CallContext, target_id: TargetId) -> ServiceResult<()> {
        let scope = self
            .scope(ctx, "delete_target", OperationClass::SingleEntity)
            .field("target_id", target_id);
        scope
            .run(scope.transaction(&self.db, "failed to delete target", move |tx| {
                let context = "failed to delete target";
                require_target(tx, target_id, context)?;
                ensure_mission_open(tx, target_id, context)?;

                let deleted = SqliteTargetRepository::new(tx)
                    .delete_target(target_id)
                    .map_err(|err| ServiceError::storage(context, err))?;
                if deleted == 0 {
                    return Err(ServiceError::NotFound(Entity::Target(target_id)));
                }
                Ok(())
            }))
            .await
    }
}

fn require_target(
    conn: &Connection,
    id: TargetId,
    context: &'static str,
) -> ServiceResult<Target> {
    SqliteTargetRepository::new(conn)
        .get_target(id)
        .map_err(|err| ServiceError::storage(context, err))?
        .ok_or(ServiceError::NotFound(Entity::Target(id)))
}

fn ensure_mission_open(
    conn: &Connection,
    target_id: TargetId,
    context: &'static str,
) -> ServiceResult<()> {
    let mission = SqliteMissionRepository::new(conn)
        .get_mission_by_target(target_id)
        .map_err(|err| ServiceError::storage(context, err))?
        .ok_or(ServiceError::NotFound(Entity::Target(target_id)))?;
    if mission.completed {
        return Err(ValidationError::MissionCompleted(mission.id).into());
    }
    Ok(())
}
