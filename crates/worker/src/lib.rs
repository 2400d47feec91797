//! Simulation worker.
//!
//! Exposes configuration loading so the binary entrypoint and tests share
//! it. The binary wires a PostgreSQL record store and queue into a
//! [`JobProcessor`](swarmsim_pipeline::JobProcessor) and runs it until
//! SIGINT or SIGTERM.

pub mod config;
