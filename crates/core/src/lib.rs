//! `jobwatch-core`: job tracking building blocks.
//!
//! This crate contains **pure** primitives (no I/O, no runtime): the job
//! identifier, the job record with its lifecycle state, and the error model.

pub mod error;
pub mod id;
pub mod job;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{Job, JobState};
