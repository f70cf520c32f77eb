//! Tracked job record and its lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;

/// Lifecycle state of a tracked job.
///
/// `Completed` and `Failed` are terminal: a job in either state is never
/// polled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted by the server, still computing.
    Pending,
    /// Result is ready to download.
    Completed,
    /// Server reported a failure (or an unclassified poll outcome).
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One server-side unit of work requested by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Human-readable label, e.g. "Gradebook for Group X / Assignment Y".
    pub description: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn pending(id: JobId, description: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            description: description.into(),
            state: JobState::Pending,
            created_at,
        }
    }

    /// Create a job that the server already reports as finished.
    pub fn completed(id: JobId, description: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            state: JobState::Completed,
            ..Self::pending(id, description, created_at)
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }

    /// Transition `Pending -> Completed`.
    pub fn complete(&mut self) -> DomainResult<()> {
        self.transition(JobState::Completed)
    }

    /// Transition `Pending -> Failed`.
    pub fn fail(&mut self) -> DomainResult<()> {
        self.transition(JobState::Failed)
    }

    fn transition(&mut self, to: JobState) -> DomainResult<()> {
        if self.state.is_terminal() {
            return Err(DomainError::invariant(format!(
                "job {} is already {} (cannot become {})",
                self.id, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::pending(JobId::new("J1"), "Report A1", Utc::now())
    }

    #[test]
    fn job_lifecycle() {
        let mut job = job();
        assert!(job.is_pending());
        assert!(!job.state.is_terminal());

        job.complete().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.state.is_terminal());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut failed = job();
        failed.fail().unwrap();
        assert!(matches!(failed.complete(), Err(DomainError::InvariantViolation(_))));
        assert_eq!(failed.state, JobState::Failed);

        let mut done = job();
        done.complete().unwrap();
        assert!(done.fail().is_err());
        assert_eq!(done.state, JobState::Completed);
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&JobState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
