//! Infrastructure layer: job store, poller, transport, collaborators, config.

pub mod config;
pub mod external;
pub mod jobs;
pub mod tracker;
pub mod transport;

pub use config::{ClientConfig, ConfigError, Endpoints};
pub use external::{FileSaver, MemorySaver, SaveError};
pub use jobs::{InMemoryJobStore, JobStore, JobStoreError, PollPolicy, Transition};
pub use tracker::{JobTracker, Submitted, TrackerError};
pub use transport::{
    HttpTransport, InMemoryTransport, Payload, PollStatus, SubmitOutcome, SubmitRequest,
    TaskRecord, Transport, TransportError,
};
