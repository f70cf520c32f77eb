//! Transport: request/response exchanges with the job endpoints.
//!
//! ## Endpoints
//!
//! - **request job**: trigger parameters in, either a ready payload or an
//!   accepted task record out
//! - **job result**: `task_id` in, ternary status out (done / still working / failed)
//! - **remove failed job**: `task_id` in, any 2xx is success
//! - **download**: `task_id` in, `"<title>\n<content>"` out
//! - **tasks**: list of active task records (used to rehydrate on reconnect)

pub mod http;
pub mod in_memory;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use jobwatch_core::{Job, JobId};

pub use http::HttpTransport;
pub use in_memory::{InMemoryTransport, PollGate, TransportCall};

/// Trigger parameters for a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub group_id: String,
    pub assignment_id: String,
}

impl SubmitRequest {
    pub fn new(group_id: impl Into<String>, assignment_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            assignment_id: assignment_id.into(),
        }
    }
}

/// A task as reported by the server (accepted submit, or tasks listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: JobId,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    /// Server timestamp. RFC 3339, or `YYYY-MM-DD HH:MM:SS` (UTC).
    #[serde(default)]
    pub datetime: Option<String>,
}

impl TaskRecord {
    pub fn new(id: impl Into<JobId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            completed: false,
            datetime: None,
        }
    }

    /// Creation time, falling back to now when absent or unparseable.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at_or(Utc::now())
    }

    /// Creation time, falling back to `fallback` when absent or unparseable.
    pub fn created_at_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.datetime
            .as_deref()
            .and_then(parse_datetime)
            .unwrap_or(fallback)
    }

    pub fn into_job(self) -> Job {
        let created_at = self.created_at();
        self.into_job_at(created_at)
    }

    /// Build the job with an already resolved creation time.
    pub fn into_job_at(self, created_at: DateTime<Utc>) -> Job {
        if self.completed {
            Job::completed(self.id, self.description, created_at)
        } else {
            Job::pending(self.id, self.description, created_at)
        }
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Body of the tasks listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksResponse {
    pub tasks: Vec<TaskRecord>,
}

/// A downloadable result: file name plus raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub title: String,
    pub content: Vec<u8>,
}

impl Payload {
    pub fn new(title: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Split a `"<title>\n<content>"` body on its first newline.
    ///
    /// A body without a newline is all title, with empty content.
    pub fn parse(body: &[u8]) -> Self {
        match body.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let title = String::from_utf8_lossy(&body[..pos]);
                Self {
                    title: title.trim_end_matches('\r').trim().to_string(),
                    content: body[pos + 1..].to_vec(),
                }
            }
            None => Self {
                title: String::from_utf8_lossy(body).trim().to_string(),
                content: Vec::new(),
            },
        }
    }
}

/// Result of a submit exchange that the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Work finished inline; nothing to track.
    Ready(Payload),
    /// Work continues server-side; poll this task.
    Accepted(TaskRecord),
}

/// Classified status of a job-result check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Status 200: the job is done.
    Done,
    /// Status 202: still working.
    Working,
    /// Any other status.
    Failed { status: u16 },
}

impl PollStatus {
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => PollStatus::Done,
            202 => PollStatus::Working,
            status => PollStatus::Failed { status },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({0}): {1}")]
    Status(u16, String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Request/response exchange against the job endpoints.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Request a new job.
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, TransportError>;

    /// Check the status of a job.
    async fn poll(&self, job_id: &JobId) -> Result<PollStatus, TransportError>;

    /// Ask the server to drop whatever a failed job left behind.
    async fn cleanup(&self, job_id: &JobId) -> Result<(), TransportError>;

    /// Fetch the result of a completed job.
    async fn download(&self, job_id: &JobId) -> Result<Payload, TransportError>;

    /// List the active tasks of the current session.
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, TransportError>;
}
