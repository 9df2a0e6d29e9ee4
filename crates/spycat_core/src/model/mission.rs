//! Mission and target domain models.
//!
//! # Responsibility
//! - Define missions, their targets, and creation inputs.
//! - Validate composition bounds and notes constraints.
//!
//! # Invariants
//! - A mission owns at most `MAX_TARGETS` targets and is created with at
//!   least one.
//! - Target notes hold at most `MAX_NOTES_CHARS` Unicode code points.
//! - `completed` flags only ever move from `false` to `true`.

use crate::model::cat::CatId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MissionId = i64;
pub type TargetId = i64;

/// Upper bound of targets per mission.
pub const MAX_TARGETS: usize = 3;
/// Upper bound of target notes length, counted in code points.
pub const MAX_NOTES_CHARS: usize = 256;

/// Sub-objective owned by exactly one mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub mission_id: MissionId,
    pub name: String,
    pub country: String,
    pub notes: String,
    pub completed: bool,
}

/// Mission with its current target set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    /// At most one cat; `None` while unassigned.
    pub assignee: Option<CatId>,
    pub targets: Vec<Target>,
    pub completed: bool,
}

impl Mission {
    /// Targets that still block mission completion.
    pub fn pending_targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|target| !target.completed)
    }

    /// A mission with no targets has nothing pending.
    pub fn can_complete(&self) -> bool {
        self.pending_targets().next().is_none()
    }
}

/// Input for one target, used by mission creation and `add_target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTarget {
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub notes: String,
}

impl NewTarget {
    pub fn new(
        name: impl Into<String>,
        country: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            country: country.into(),
            notes: notes.into(),
        }
    }

    pub fn validate(&self) -> Result<(), MissionValidationError> {
        if self.name.trim().is_empty() {
            return Err(MissionValidationError::EmptyTargetName);
        }
        if self.country.trim().is_empty() {
            return Err(MissionValidationError::EmptyCountry);
        }
        validate_notes_length(&self.notes)
    }
}

/// Shape violations of mission and target inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionValidationError {
    /// Creation target count outside `1..=MAX_TARGETS`.
    TargetCount(usize),
    EmptyTargetName,
    EmptyCountry,
    EmptyNotes,
    NotesTooLong(usize),
}

impl Display for MissionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetCount(count) => write!(
                f,
                "incorrect number of targets {count} (expected 1..{MAX_TARGETS})"
            ),
            Self::EmptyTargetName => write!(f, "target name must not be blank"),
            Self::EmptyCountry => write!(f, "target country must not be blank"),
            Self::EmptyNotes => write!(f, "notes can't be empty"),
            Self::NotesTooLong(count) => write!(
                f,
                "notes have {count} characters (max {MAX_NOTES_CHARS})"
            ),
        }
    }
}

impl Error for MissionValidationError {}

/// Validates the target list of a new mission.
pub fn validate_new_mission(targets: &[NewTarget]) -> Result<(), MissionValidationError> {
    if targets.is_empty() || targets.len() > MAX_TARGETS {
        return Err(MissionValidationError::TargetCount(targets.len()));
    }
    targets.iter().try_for_each(NewTarget::validate)
}

/// Validates replacement notes: non-empty and within the length cap.
pub fn validate_notes(notes: &str) -> Result<(), MissionValidationError> {
    if notes.is_empty() {
        return Err(MissionValidationError::EmptyNotes);
    }
    validate_notes_length(notes)
}

fn validate_notes_length(notes: &str) -> Result<(), MissionValidationError> {
    let count = notes.chars().count();
    if count > MAX_NOTES_CHARS {
        return Err(MissionValidationError::NotesTooLong(count));
    }
    Ok(())
}
