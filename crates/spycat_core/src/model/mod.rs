//! Domain model for cats, missions and targets.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Provide input validation that does not need storage access.
//!
//! # Invariants
//! - Identities are assigned by storage and never reused.
//! - Cats relate to missions by reference only (`Mission::assignee`).

pub mod cat;
pub mod mission;
