//! Persistence gateway: repository contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define per-entity CRUD contracts consumed by the service layer.
//! - Isolate SQLite query details from business orchestration.
//!
//! # Invariants
//! - Repositories never enforce business rules; services do.
//! - Lookups report absence as `None`, deletes as an affected-row count.
//! - Repositories accept any `&Connection`, including a `Transaction`
//!   (which derefs to one), so the same code runs inside or outside a
//!   transaction.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod cat_repo;
pub mod mappers;
pub mod mission_repo;
pub mod target_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage-level failure.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Persisted row cannot be mapped to a valid domain value.
    InvalidData(String),
}

impl RepoError {
    /// Underlying SQLite error, when there is one.
    pub fn sqlite_error(&self) -> Option<&rusqlite::Error> {
        match self {
            Self::Db(DbError::Sqlite(err)) => Some(err),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
