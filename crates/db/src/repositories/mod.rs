//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod outbox_repo;
pub mod queue_repo;
pub mod simulation_repo;

pub use outbox_repo::OutboxRepo;
pub use queue_repo::QueueRepo;
pub use simulation_repo::SimulationRepo;
