//! Service error taxonomy.
//!
//! # Responsibility
//! - Define the only error type callers of the service layer see.
//! - Reclassify storage and runtime failures (interrupts, busy timeouts,
//!   join errors) into that taxonomy.
//!
//! # Invariants
//! - Deadline expiry is always `TimeoutExceeded`, never `Internal`.
//! - Absent entities are `NotFound` with the entity and id that was missing.

use crate::model::cat::{CatId, CatValidationError};
use crate::model::mission::{MissionId, MissionValidationError, TargetId};
use crate::repo::RepoError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Entity reference carried by `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Cat(CatId),
    Mission(MissionId),
    Target(TargetId),
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cat(id) => write!(f, "cat {id}"),
            Self::Mission(id) => write!(f, "mission {id}"),
            Self::Target(id) => write!(f, "target {id}"),
        }
    }
}

/// Caller-correctable precondition failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Cat(CatValidationError),
    Mission(MissionValidationError),
    UnknownBreed(String),
    /// Mission already owns the maximum number of targets.
    CapacityExceeded(MissionId),
    PendingTargets {
        mission_id: MissionId,
        pending: usize,
    },
    TargetCompleted(TargetId),
    /// Completed missions accept reads only.
    MissionCompleted(MissionId),
    MissionAssigned {
        mission_id: MissionId,
        assignee: CatId,
    },
    CatOnActiveMission {
        cat_id: CatId,
        mission_id: MissionId,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cat(err) => write!(f, "{err}"),
            Self::Mission(err) => write!(f, "{err}"),
            Self::UnknownBreed(breed) => write!(f, "unknown breed `{breed}`"),
            Self::CapacityExceeded(_) => write!(f, "mission has maximum targets (3)"),
            Self::PendingTargets { pending, .. } => {
                write!(f, "mission has pending targets ({pending})")
            }
            Self::TargetCompleted(_) => write!(f, "can't change notes of a completed target"),
            Self::MissionCompleted(id) => write!(f, "mission {id} is completed"),
            Self::MissionAssigned { .. } => write!(f, "can't delete an assigned mission"),
            Self::CatOnActiveMission { mission_id, .. } => write!(
                f,
                "can't delete a cat assigned to active mission {mission_id}"
            ),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Cat(err) => Some(err),
            Self::Mission(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CatValidationError> for ValidationError {
    fn from(value: CatValidationError) -> Self {
        Self::Cat(value)
    }
}

impl From<MissionValidationError> for ValidationError {
    fn from(value: MissionValidationError) -> Self {
        Self::Mission(value)
    }
}

/// Coarse error class for boundary mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    TimeoutExceeded,
    Cancelled,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::TimeoutExceeded => "timeout_exceeded",
            Self::Cancelled => "cancelled",
            Self::Validation => "validation",
            Self::Internal => "internal",
        }
    }

    /// HTTP status class an outer transport layer should answer with.
    pub fn http_status_class(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::TimeoutExceeded => 408,
            Self::Cancelled => 499,
            Self::Validation => 422,
            Self::Internal => 500,
        }
    }
}

/// Error returned by every service operation.
#[derive(Debug)]
pub enum ServiceError {
    NotFound(Entity),
    TimeoutExceeded,
    /// The caller's cancel signal fired.
    Cancelled,
    Validation(ValidationError),
    Internal {
        /// Operation-level description, safe to show to callers.
        context: &'static str,
        source: Option<Box<dyn Error + Send + Sync + 'static>>,
    },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::TimeoutExceeded => ErrorKind::TimeoutExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn internal_with<E>(context: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::Internal {
            context,
            source: Some(source.into()),
        }
    }

    /// Reclassifies a storage failure. Interrupted statements mean the
    /// deadline (or cancel) handler fired.
    pub(crate) fn storage(context: &'static str, err: RepoError) -> Self {
        if let Some(rusqlite::Error::SqliteFailure(inner, _)) = err.sqlite_error() {
            if inner.code == ErrorCode::OperationInterrupted {
                return Self::TimeoutExceeded;
            }
        }
        Self::internal_with(context, err)
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::TimeoutExceeded => write!(f, "timeout exceeded"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Internal { context, .. } => write!(f, "{context}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Internal {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<CatValidationError> for ServiceError {
    fn from(value: CatValidationError) -> Self {
        Self::Validation(value.into())
    }
}

impl From<MissionValidationError> for ServiceError {
    fn from(value: MissionValidationError) -> Self {
        Self::Validation(value.into())
    }
}
