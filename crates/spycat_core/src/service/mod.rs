//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Bound every operation by a deadline and classify its failures.
//!
//! # Invariants
//! - Callers only ever see `ServiceError`.
//! - Storage work never runs on the async executor threads.

pub mod breed;
pub mod cat_service;
pub mod context;
pub mod error;
pub mod mission_service;
pub mod target_service;
pub mod timeout;
