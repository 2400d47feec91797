//! Domain building blocks for the SwarmSim job pipeline.
//!
//! Everything in this crate is pure: no database, no network. The `db`,
//! `pipeline`, `api` and `worker` crates build on these types.

pub mod error;
pub mod lifecycle;
pub mod message;
pub mod simulation;
pub mod types;
pub mod workload;
