//! Mission use-case service and cat assignment coordinator.
//!
//! # Responsibility
//! - Create missions together with their targets in one transaction.
//! - Assign cats to missions while keeping every cat on at most one active
//!   mission.
//! - Complete and delete missions under their state guards.
//!
//! # Invariants
//! - The current-mission lookup, the idempotency check and both assignee
//!   writes of `assign_cat` run inside one `BEGIN IMMEDIATE` transaction, so
//!   concurrent assignments of the same cat serialize on the write lock.
//! - The previous mission is released before the new one is taken; the
//!   partial unique index on active assignees holds after every statement.
//! - Completed missions are never reassigned.

use super::context::CallContext;
use super::error::{Entity, ServiceError, ServiceResult, ValidationError};
use super::timeout::{OperationClass, OperationScope, TimeoutPolicy};
use crate::db::Database;
use crate::model::cat::CatId;
use crate::model::mission::{validate_new_mission, Mission, MissionId, NewTarget, Target};
use crate::repo::cat_repo::cat_exists;
use crate::repo::mappers::MissionRecord;
use crate::repo::mission_repo::{MissionRepository, SqliteMissionRepository};
use crate::repo::target_repo::{SqliteTargetRepository, TargetRepository};
use crate::repo::RepoError;
use log::debug;
use rusqlite::Connection;
use std::collections::HashMap;

const MODULE: &str = "mission_service";

/// Mission service facade over the connection pool.
#[derive(Clone)]
pub struct MissionService {
    db: Database,
    policy: TimeoutPolicy,
}

impl MissionService {
    pub fn new(db: Database, policy: TimeoutPolicy) -> Self {
        Self { db, policy }
    }

    fn scope(&self, ctx: &CallContext, op: &'static str, class: OperationClass) -> OperationScope {
        OperationScope::new(&self.policy, ctx, MODULE, op, class)
    }

    /// Lists every mission with its targets, ordered by id.
    pub async fn list_missions(&self, ctx: &CallContext) -> ServiceResult<Vec<Mission>> {
        let scope = self.scope(ctx, "list_missions", OperationClass::BulkRead);
        scope
            .run(scope.storage(&self.db, "failed to get missions", |conn| {
                let context = "failed to get missions";
                let records = SqliteMissionRepository::new(conn)
                    .list_missions()
                    .map_err(|err| ServiceError::storage(context, err))?;
                let targets = SqliteTargetRepository::new(conn)
                    .list_all_targets()
                    .map_err(|err| ServiceError::storage(context, err))?;
                Ok(group_targets(records, targets))
            }))
            .await
    }

    /// Creates a mission with 1 to 3 targets atomically.
    pub async fn create_mission(
        &self,
        ctx: &CallContext,
        targets: Vec<NewTarget>,
    ) -> ServiceResult<Mission> {
        let scope = self
            .scope(ctx, "create_mission", OperationClass::Transactional)
            .field("targets", targets.len());
        scope
            .run(async {
                validate_new_mission(&targets)?;
                scope
                    .transaction(&self.db, "failed to create mission", move |tx| {
                        let context = "failed to create mission";
                        let record = SqliteMissionRepository::new(tx)
                            .create_mission()
                            .map_err(|err| ServiceError::storage(context, err))?;
                        let target_repo = SqliteTargetRepository::new(tx);
                        let mut created = Vec::with_capacity(targets.len());
                        for target in &targets {
                            created.push(
                                target_repo
                                    .create_target(record.id, target)
                                    .map_err(|err| ServiceError::storage(context, err))?,
                            );
                        }
                        debug!(
                            "event=create_mission module={} status=staged mission_id={}",
                            MODULE, record.id
                        );
                        Ok(record.into_mission(created))
                    })
                    .await
            })
            .await
    }

    pub async fn get_mission(&self, ctx: &CallContext, id: MissionId) -> ServiceResult<Mission> {
        let scope = self
            .scope(ctx, "get_mission", OperationClass::SingleEntity)
            .field("mission_id", id);
        scope
            .run(scope.storage(&self.db, "failed to get mission", move |conn| {
                load_mission(conn, id, "failed to get mission")
            }))
            .await
    }

    /// Puts `cat_id` on `mission_id`, releasing the cat's previous active
    /// mission in the same transaction.
    ///
    /// Reassigning a cat to its current mission returns that mission
    /// without writing.
    ///
    /// # Errors
    /// - `NotFound(Cat)` / `NotFound(Mission)` for missing entities.
    /// - `Validation(MissionCompleted)` when the mission is completed.
    /// - `TimeoutExceeded` when any step runs out of budget.
    pub async fn assign_cat(
        &self,
        ctx: &CallContext,
        mission_id: MissionId,
        cat_id: CatId,
    ) -> ServiceResult<Mission> {
        let scope = self
            .scope(ctx, "assign_cat", OperationClass::Transactional)
            .field("mission_id", mission_id)
            .field("cat_id", cat_id);
        let lookup_budget = self.policy.single_entity;
        scope
            .run(async {
                scope
                    .storage_within(&self.db, lookup_budget, "failed to get cat", move |conn| {
                        match cat_exists(conn, cat_id) {
                            Ok(true) => Ok(()),
                            Ok(false) => Err(ServiceError::NotFound(Entity::Cat(cat_id))),
                            Err(err) => Err(ServiceError::storage("failed to get cat", err)),
                        }
                    })
                    .await?;

                scope
                    .storage_within(
                        &self.db,
                        lookup_budget,
                        "failed to get mission",
                        move |conn| {
                            require_mission(conn, mission_id, "failed to get mission").map(|_| ())
                        },
                    )
                    .await?;

                // Fast path: no transaction when the cat is already there.
                let current = scope
                    .storage_within(
                        &self.db,
                        lookup_budget,
                        "failed to assign cat",
                        move |conn| {
                            let record = SqliteMissionRepository::new(conn)
                                .get_active_cat_mission(cat_id)
                                .map_err(|err| ServiceError::storage("failed to assign cat", err))?;
                            match record {
                                Some(record) if record.id == mission_id => Ok(Some(
                                    attach_targets(conn, record, "failed to assign cat")?,
                                )),
                                _ => Ok(None),
                            }
                        },
                    )
                    .await?;
                if let Some(mission) = current {
                    debug!(
                        "event=assign_cat module={} status=noop request_id={} mission_id={} cat_id={}",
                        MODULE,
                        ctx.request_id(),
                        mission_id,
                        cat_id
                    );
                    return Ok(mission);
                }

                scope
                    .transaction(&self.db, "failed to assign cat", move |tx| {
                        assign_in_transaction(tx, mission_id, cat_id)
                    })
                    .await
            })
            .await
    }

    /// Marks a mission completed once none of its targets is pending.
    pub async fn complete_mission(
        &self,
        ctx: &CallContext,
        id: MissionId,
    ) -> ServiceResult<Mission> {
        let scope = self
            .scope(ctx, "complete_mission", OperationClass::SingleEntity)
            .field("mission_id", id);
        scope
            .run(scope.transaction(&self.db, "failed to complete mission", move |tx| {
                let context = "failed to complete mission";
                let mission = load_mission(tx, id, context)?;
                if mission.completed {
                    return Ok(mission);
                }
                let pending = mission.pending_targets().count();
                if pending > 0 {
                    return Err(ValidationError::PendingTargets {
                        mission_id: id,
                        pending,
                    }
                    .into());
                }

                let record = SqliteMissionRepository::new(tx)
                    .complete_mission(id)
                    .map_err(|err| ServiceError::storage(context, err))?
                    .ok_or(ServiceError::NotFound(Entity::Mission(id)))?;
                Ok(record.into_mission(mission.targets))
            }))
            .await
    }

    /// Deletes an unassigned mission and its targets.
    pub async fn delete_mission(&self, ctx: &CallContext, id: MissionId) -> ServiceResult<()> {
        let scope = self
            .scope(ctx, "delete_mission", OperationClass::SingleEntity)
            .field("mission_id", id);
        scope
            .run(scope.transaction(&self.db, "failed to delete mission", move |tx| {
                let context = "failed to delete mission";
                let record = require_mission(tx, id, context)?;
                if let Some(assignee) = record.assignee {
                    return Err(ValidationError::MissionAssigned {
                        mission_id: id,
                        assignee,
                    }
                    .into());
                }

                let deleted = SqliteMissionRepository::new(tx)
                    .delete_mission(id)
                    .map_err(|err| ServiceError::storage(context, err))?;
                if deleted == 0 {
                    return Err(ServiceError::NotFound(Entity::Mission(id)));
                }
                Ok(())
            }))
            .await
    }
}

/// Body of the assignment transaction; runs under the write lock.
fn assign_in_transaction(
    conn: &Connection,
    mission_id: MissionId,
    cat_id: CatId,
) -> ServiceResult<Mission> {
    let context = "failed to assign cat";
    let storage = |err: RepoError| ServiceError::storage(context, err);
    let missions = SqliteMissionRepository::new(conn);

    // Authoritative state: read under the write lock.
    if !cat_exists(conn, cat_id).map_err(storage)? {
        return Err(ServiceError::NotFound(Entity::Cat(cat_id)));
    }
    let target = missions
        .get_mission(mission_id)
        .map_err(storage)?
        .ok_or(ServiceError::NotFound(Entity::Mission(mission_id)))?;
    if target.completed {
        return Err(ValidationError::MissionCompleted(mission_id).into());
    }

    let previous = missions.get_active_cat_mission(cat_id).map_err(storage)?;
    match previous {
        Some(previous) if previous.id == mission_id => {
            return attach_targets(conn, previous, context);
        }
        Some(previous) => {
            missions
                .set_assignee(previous.id, None)
                .map_err(storage)?
                .ok_or(ServiceError::NotFound(Entity::Mission(previous.id)))?;
            debug!(
                "event=assign_cat module={} status=released mission_id={} cat_id={}",
                MODULE, previous.id, cat_id
            );
        }
        None => {}
    }

    let assigned = missions
        .set_assignee(mission_id, Some(cat_id))
        .map_err(storage)?
        .ok_or(ServiceError::NotFound(Entity::Mission(mission_id)))?;
    attach_targets(conn, assigned, context)
}

/// Joins missions with targets read in `(mission_id, id)` order.
fn group_targets(records: Vec<MissionRecord>, targets: Vec<Target>) -> Vec<Mission> {
    let mut by_mission: HashMap<MissionId, Vec<Target>> = HashMap::new();
    for target in targets {
        by_mission.entry(target.mission_id).or_default().push(target);
    }
    records
        .into_iter()
        .map(|record| {
            let targets = by_mission.remove(&record.id).unwrap_or_default();
            record.into_mission(targets)
        })
        .collect()
}

pub(crate) fn require_mission(
    conn: &Connection,
    id: MissionId,
    context: &'static str,
) -> ServiceResult<MissionRecord> {
    SqliteMissionRepository::new(conn)
        .get_mission(id)
        .map_err(|err| ServiceError::storage(context, err))?
        .ok_or(ServiceError::NotFound(Entity::Mission(id)))
}

/// Reads a mission and its targets.
pub(crate) fn load_mission(
    conn: &Connection,
    id: MissionId,
    context: &'static str,
) -> ServiceResult<Mission> {
    let record = require_mission(conn, id, context)?;
    attach_targets(conn, record, context)
}

fn attach_targets(
    conn: &Connection,
    record: MissionRecord,
    context: &'static str,
) -> ServiceResult<Mission> {
    let targets = SqliteTargetRepository::new(conn)
        .list_mission_targets(record.id)
        .map_err(|err| ServiceError::storage(context, err))?;
    Ok(record.into_mission(targets))
}
