//! Job dispatch and processing pipeline.
//!
//! - [`store::RecordStore`] / [`transport::QueueTransport`] : the contracts
//!   the pipeline needs from the record store and the message broker, each
//!   with a PostgreSQL and an in-memory implementation.
//! - [`submitter::SimulationSubmitter`] : creates a `queued` record and its
//!   outbox row in one transaction.
//! - [`outbox::OutboxRelay`] : publishes outbox rows to the queue.
//! - [`processor::JobProcessor`] : the worker loop: claims one message at a
//!   time, runs the workload, writes the terminal status, then settles the
//!   message.

pub mod error;
pub mod outbox;
pub mod processor;
pub mod store;
pub mod submitter;
pub mod transport;

pub use error::{PipelineError, StoreError, TransportError};
pub use outbox::OutboxRelay;
pub use processor::{Disposition, JobProcessor, ProcessorConfig};
pub use store::{InMemoryRecordStore, PgRecordStore, RecordStore};
pub use submitter::SimulationSubmitter;
pub use transport::{Delivery, InMemoryQueue, PgQueueTransport, QueueTransport};
