//! Core domain logic for the spy cat agency.
//! Owns the assignment, target lifecycle and breed validation invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, Database, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LogSink};
pub use model::cat::{Cat, CatId, CatValidationError, NewCat};
pub use model::mission::{
    Mission, MissionId, MissionValidationError, NewTarget, Target, TargetId, MAX_NOTES_CHARS,
    MAX_TARGETS,
};
pub use repo::{RepoError, RepoResult};
pub use service::breed::{BreedDirectory, BreedDirectoryError, HttpBreedDirectory};
pub use service::cat_service::CatService;
pub use service::context::{CallContext, CancelSignal};
pub use service::error::{Entity, ErrorKind, ServiceError, ServiceResult, ValidationError};
pub use service::mission_service::MissionService;
pub use service::target_service::TargetService;
pub use service::timeout::{Deadline, OperationClass, TimeoutPolicy};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
