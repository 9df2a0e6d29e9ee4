//! Cat use-case service.
//!
//! # Responsibility
//! - Provide list/create/get/update-salary/delete entry points for cats.
//! - Gate creation on the breed directory within a nested deadline.
//!
//! # Invariants
//! - A cat is inserted only after its breed was confirmed known.
//! - A cat on an active mission cannot be deleted; the check and the delete
//!   share one immediate transaction.

use super::breed::{validate_breed, BreedDirectory, BreedGateError};
use super::context::CallContext;
use super::error::{Entity, ServiceError, ServiceResult, ValidationError};
use super::timeout::{OperationClass, OperationScope, TimeoutPolicy};
use crate::db::Database;
use crate::model::cat::{validate_salary, Cat, CatId, NewCat};
use crate::repo::cat_repo::{CatRepository, SqliteCatRepository};
use crate::repo::mission_repo::{MissionRepository, SqliteMissionRepository};
use log::warn;
use std::sync::Arc;

const MODULE: &str = "cat_service";

/// Cat service facade over the connection pool and breed directory.
#[derive(Clone)]
pub struct CatService {
    db: Database,
    breeds: Arc<dyn BreedDirectory>,
    policy: TimeoutPolicy,
}

impl CatService {
    pub fn new(db: Database, breeds: Arc<dyn BreedDirectory>, policy: TimeoutPolicy) -> Self {
        Self { db, breeds, policy }
    }

    fn scope(&self, ctx: &CallContext, op: &'static str, class: OperationClass) -> OperationScope {
        OperationScope::new(&self.policy, ctx, MODULE, op, class)
    }

    /// Lists every cat ordered by id.
    pub async fn list_cats(&self, ctx: &CallContext) -> ServiceResult<Vec<Cat>> {
        let scope = self.scope(ctx, "list_cats", OperationClass::BulkRead);
        scope
            .run(scope.storage(&self.db, "failed to fetch cats", |conn| {
                SqliteCatRepository::new(conn)
                    .list_cats()
                    .map_err(|err| ServiceError::storage("failed to fetch cats", err))
            }))
            .await
    }

    /// Validates input, confirms the breed with the directory, then inserts.
    ///
    /// # Errors
    /// - `Validation` for bad fields or an unknown breed.
    /// - `Internal` when the directory lookup itself fails.
    /// - `TimeoutExceeded` when the lookup or the insert runs out of budget.
    pub async fn create_cat(&self, ctx: &CallContext, cat: NewCat) -> ServiceResult<Cat> {
        let scope = self.scope(ctx, "create_cat", OperationClass::Transactional);
        scope
            .run(async {
                cat.validate()?;

                let breed_deadline = scope.deadline().nested(self.policy.breed_lookup);
                match validate_breed(&self.breeds, &cat.breed, breed_deadline).await {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(ValidationError::UnknownBreed(cat.breed.clone()).into());
                    }
                    Err(BreedGateError::TimedOut) => return Err(ServiceError::TimeoutExceeded),
                    Err(err) => {
                        warn!(
                            "event=create_cat module={} status=error request_id={} error_code=breed_lookup_failed error={}",
                            MODULE,
                            ctx.request_id(),
                            err
                        );
                        return Err(ServiceError::internal_with("failed to create a cat", err));
                    }
                }

                scope
                    .storage_within(
                        &self.db,
                        self.policy.cat_insert,
                        "failed to create a cat",
                        move |conn| {
                            SqliteCatRepository::new(conn)
                                .create_cat(&cat)
                                .map_err(|err| ServiceError::storage("failed to create a cat", err))
                        },
                    )
                    .await
            })
            .await
    }

    pub async fn get_cat(&self, ctx: &CallContext, id: CatId) -> ServiceResult<Cat> {
        let scope = self
            .scope(ctx, "get_cat", OperationClass::SingleEntity)
            .field("cat_id", id);
        scope
            .run(scope.storage(&self.db, "failed to get cat", move |conn| {
                SqliteCatRepository::new(conn)
                    .get_cat(id)
                    .map_err(|err| ServiceError::storage("failed to get cat", err))?
                    .ok_or(ServiceError::NotFound(Entity::Cat(id)))
            }))
            .await
    }

    pub async fn update_cat_salary(
        &self,
        ctx: &CallContext,
        id: CatId,
        salary: i32,
    ) -> ServiceResult<Cat> {
        let scope = self
            .scope(ctx, "update_cat_salary", OperationClass::SingleEntity)
            .field("cat_id", id);
        scope
            .run(async {
                validate_salary(salary)?;
                scope
                    .storage(&self.db, "failed to update salary", move |conn| {
                        SqliteCatRepository::new(conn)
                            .update_cat_salary(id, salary)
                            .map_err(|err| ServiceError::storage("failed to update salary", err))?
                            .ok_or(ServiceError::NotFound(Entity::Cat(id)))
                    })
                    .await
            })
            .await
    }

    /// Deletes a cat that is not on an active mission. Completed missions it
    /// worked on lose their assignee reference.
    pub async fn delete_cat(&self, ctx: &CallContext, id: CatId) -> ServiceResult<()> {
        let scope = self
            .scope(ctx, "delete_cat", OperationClass::SingleEntity)
            .field("cat_id", id);
        scope
            .run(scope.transaction(&self.db, "failed to delete cat", move |tx| {
                let active = SqliteMissionRepository::new(tx)
                    .get_active_cat_mission(id)
                    .map_err(|err| ServiceError::storage("failed to delete cat", err))?;
                if let Some(mission) = active {
                    return Err(ValidationError::CatOnActiveMission {
                        cat_id: id,
                        mission_id: mission.id,
                    }
                    .into());
                }

                let deleted = SqliteCatRepository::new(tx)
                    .delete_cat(id)
                    .map_err(|err| ServiceError::storage("failed to delete cat", err))?;
                if deleted == 0 {
                    return Err(ServiceError::NotFound(Entity::Cat(id)));
                }
                Ok(())
            }))
            .await
    }
}
