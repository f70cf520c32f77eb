//! Job Record Store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jobwatch_core::{Job, JobId, JobState};

use super::types::Transition;

/// Job store abstraction.
///
/// Mutated only by insertion on acceptance, in-place transition on poll
/// resolution, and removal on an explicit user command.
pub trait JobStore: Send + Sync {
    /// Track a newly accepted job. It becomes the newest entry.
    fn insert(&self, job: Job) -> Result<(), JobStoreError>;

    /// Get a job by ID.
    fn get(&self, job_id: &JobId) -> Result<Option<Job>, JobStoreError>;

    /// Whether the job is still tracked.
    fn contains(&self, job_id: &JobId) -> Result<bool, JobStoreError> {
        Ok(self.get(job_id)?.is_some())
    }

    /// Transition a pending job to `Completed`.
    fn mark_completed(&self, job_id: &JobId) -> Result<Transition, JobStoreError>;

    /// Transition a pending job to `Failed`.
    fn mark_failed(&self, job_id: &JobId) -> Result<Transition, JobStoreError>;

    /// Delete the job unconditionally. Returns the removed job, if any.
    fn remove(&self, job_id: &JobId) -> Result<Option<Job>, JobStoreError>;

    /// All tracked jobs, newest insertion first.
    fn list_newest_first(&self) -> Result<Vec<Job>, JobStoreError>;

    /// Get job statistics.
    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job already tracked: {0}")]
    AlreadyExists(JobId),
    #[error("job store lock poisoned")]
    Poisoned,
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn total(&self) -> usize {
        self.pending + self.completed + self.failed
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    job: Job,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    jobs: HashMap<JobId, Entry>,
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn transition(
        &self,
        job_id: &JobId,
        apply: impl FnOnce(&mut Job) -> jobwatch_core::DomainResult<()>,
    ) -> Result<Transition, JobStoreError> {
        let mut inner = self.inner.write().map_err(|_| JobStoreError::Poisoned)?;
        let Some(entry) = inner.jobs.get_mut(job_id) else {
            return Ok(Transition::Missing);
        };
        let before = entry.job.state;
        match apply(&mut entry.job) {
            Ok(()) => Ok(Transition::Applied),
            Err(_) => Ok(Transition::AlreadyTerminal(before)),
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().map_err(|_| JobStoreError::Poisoned)?;
        if inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(job.id.clone(), Entry { seq, job });
        Ok(())
    }

    fn get(&self, job_id: &JobId) -> Result<Option<Job>, JobStoreError> {
        let inner = self.inner.read().map_err(|_| JobStoreError::Poisoned)?;
        Ok(inner.jobs.get(job_id).map(|e| e.job.clone()))
    }

    fn mark_completed(&self, job_id: &JobId) -> Result<Transition, JobStoreError> {
        self.transition(job_id, Job::complete)
    }

    fn mark_failed(&self, job_id: &JobId) -> Result<Transition, JobStoreError> {
        self.transition(job_id, Job::fail)
    }

    fn remove(&self, job_id: &JobId) -> Result<Option<Job>, JobStoreError> {
        let mut inner = self.inner.write().map_err(|_| JobStoreError::Poisoned)?;
        Ok(inner.jobs.remove(job_id).map(|e| e.job))
    }

    fn list_newest_first(&self) -> Result<Vec<Job>, JobStoreError> {
        let inner = self.inner.read().map_err(|_| JobStoreError::Poisoned)?;
        let mut entries: Vec<_> = inner.jobs.values().collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(entries.into_iter().map(|e| e.job.clone()).collect())
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let inner = self.inner.read().map_err(|_| JobStoreError::Poisoned)?;
        let mut stats = JobStats::default();
        for entry in inner.jobs.values() {
            match entry.job.state {
                JobState::Pending => stats.pending += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pending(id: &str) -> Job {
        Job::pending(JobId::new(id), format!("Report {id}"), Utc::now())
    }

    #[test]
    fn lists_newest_insertion_first() {
        let store = InMemoryJobStore::new();
        store.insert(pending("J1")).unwrap();
        store.insert(pending("J2")).unwrap();
        store.insert(pending("J3")).unwrap();

        // Resolution order does not move entries.
        store.mark_completed(&JobId::new("J1")).unwrap();

        let ids: Vec<_> = store
            .list_newest_first()
            .unwrap()
            .into_iter()
            .map(|j| j.id.to_string())
            .collect();
        assert_eq!(ids, vec!["J3", "J2", "J1"]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = InMemoryJobStore::new();
        store.insert(pending("J1")).unwrap();
        assert!(matches!(
            store.insert(pending("J1")),
            Err(JobStoreError::AlreadyExists(_))
        ));
        assert_eq!(store.stats().unwrap().total(), 1);
    }

    #[test]
    fn transitions_report_missing_and_terminal() {
        let store = InMemoryJobStore::new();
        let id = JobId::new("J1");

        assert_eq!(store.mark_completed(&id).unwrap(), Transition::Missing);

        store.insert(pending("J1")).unwrap();
        assert_eq!(store.mark_failed(&id).unwrap(), Transition::Applied);
        assert_eq!(
            store.mark_completed(&id).unwrap(),
            Transition::AlreadyTerminal(JobState::Failed)
        );
        assert_eq!(store.get(&id).unwrap().unwrap().state, JobState::Failed);
    }

    #[test]
    fn remove_is_unconditional() {
        let store = InMemoryJobStore::new();
        store.insert(pending("J1")).unwrap();

        let removed = store.remove(&JobId::new("J1")).unwrap();
        assert_eq!(removed.map(|j| j.state), Some(JobState::Pending));
        assert!(!store.contains(&JobId::new("J1")).unwrap());
        assert!(store.remove(&JobId::new("J1")).unwrap().is_none());
    }

    #[test]
    fn stats_count_by_state() {
        let store = InMemoryJobStore::new();
        for id in ["J1", "J2", "J3"] {
            store.insert(pending(id)).unwrap();
        }
        store.mark_completed(&JobId::new("J1")).unwrap();
        store.mark_failed(&JobId::new("J2")).unwrap();

        assert_eq!(
            store.stats().unwrap(),
            JobStats {
                pending: 1,
                completed: 1,
                failed: 1
            }
        );
    }
}
