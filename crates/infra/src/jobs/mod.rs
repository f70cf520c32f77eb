//! Job tracking: the record store, poll policy, and the poller.
//!
//! ## Components
//!
//! - `JobStore`: tracked jobs keyed by id, listed newest first
//! - `PollPolicy`: delay between status checks (fixed 1s, unbounded by default)
//! - `Poller`: one polling task per pending job, resolving into the store

pub mod poller;
pub mod store;
pub mod types;

pub use poller::{PollSink, Poller, Resolution};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{BackoffStrategy, CHECK_EVERY, PollPolicy, Transition};
