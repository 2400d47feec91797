//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` struct matching its table plus the
//! query/input types its repository accepts.

pub mod outbox;
pub mod queue;
pub mod simulation;
