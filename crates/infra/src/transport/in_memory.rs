//! Scriptable in-memory transport for tests/dev.
//!
//! - Submit, poll, cleanup and download answers are queued per call
//! - Unscripted polls answer "still working"
//! - Every call is recorded, in order
//! - Polls for a gated job wait until the gate is released, which keeps a
//!   poll in flight for as long as a test needs

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use jobwatch_core::JobId;
use tokio::sync::Semaphore;

use super::{
    Payload, PollStatus, SubmitOutcome, SubmitRequest, TaskRecord, Transport, TransportError,
};

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Submit(SubmitRequest),
    Poll(JobId),
    Cleanup(JobId),
    Download(JobId),
    ListTasks,
}

/// Holds polls of one job in flight until released.
#[derive(Debug, Clone)]
pub struct PollGate {
    permits: Arc<Semaphore>,
}

impl PollGate {
    /// Let one held (or future) poll through.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }
}

#[derive(Debug, Default)]
struct State {
    submits: VecDeque<Result<SubmitOutcome, TransportError>>,
    polls: HashMap<JobId, VecDeque<Result<PollStatus, TransportError>>>,
    cleanups: VecDeque<Result<(), TransportError>>,
    downloads: HashMap<JobId, VecDeque<Result<Payload, TransportError>>>,
    tasks: Vec<TaskRecord>,
    gates: HashMap<JobId, Arc<Semaphore>>,
    calls: Vec<TransportCall>,
}

#[derive(Debug, Default)]
pub struct InMemoryTransport {
    state: Mutex<State>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread is the only way to poison this; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the answer to the next submit.
    pub fn script_submit(&self, outcome: Result<SubmitOutcome, TransportError>) {
        self.state().submits.push_back(outcome);
    }

    /// Queue an accepted submit for a pending task.
    pub fn accept_next(&self, id: &str, description: &str) {
        self.script_submit(Ok(SubmitOutcome::Accepted(TaskRecord::new(id, description))));
    }

    /// Queue poll answers for a job (after these run out, polls answer "still working").
    pub fn script_polls<I>(&self, job_id: &str, statuses: I)
    where
        I: IntoIterator<Item = Result<PollStatus, TransportError>>,
    {
        self.state()
            .polls
            .entry(JobId::new(job_id))
            .or_default()
            .extend(statuses);
    }

    /// Queue the answer to the next cleanup (unscripted cleanups succeed).
    pub fn script_cleanup(&self, outcome: Result<(), TransportError>) {
        self.state().cleanups.push_back(outcome);
    }

    /// Queue a download answer for a job (unscripted downloads answer 404).
    pub fn script_download(&self, job_id: &str, outcome: Result<Payload, TransportError>) {
        self.state()
            .downloads
            .entry(JobId::new(job_id))
            .or_default()
            .push_back(outcome);
    }

    /// Set the tasks listing.
    pub fn set_tasks(&self, tasks: Vec<TaskRecord>) {
        self.state().tasks = tasks;
    }

    /// Hold every poll of `job_id` until the returned gate is released.
    pub fn gate_polls(&self, job_id: &str) -> PollGate {
        let permits = Arc::new(Semaphore::new(0));
        self.state()
            .gates
            .insert(JobId::new(job_id), Arc::clone(&permits));
        PollGate { permits }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    pub fn poll_count(&self, job_id: &str) -> usize {
        self.count(|c| matches!(c, TransportCall::Poll(id) if id.as_str() == job_id))
    }

    pub fn download_count(&self, job_id: &str) -> usize {
        self.count(|c| matches!(c, TransportCall::Download(id) if id.as_str() == job_id))
    }

    pub fn cleanup_count(&self, job_id: &str) -> usize {
        self.count(|c| matches!(c, TransportCall::Cleanup(id) if id.as_str() == job_id))
    }

    fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait::async_trait]
impl Transport for InMemoryTransport {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::Submit(request.clone()));
        state
            .submits
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Status(500, "no submit scripted".to_string())))
    }

    async fn poll(&self, job_id: &JobId) -> Result<PollStatus, TransportError> {
        let gate = {
            let mut state = self.state();
            state.calls.push(TransportCall::Poll(job_id.clone()));
            state.gates.get(job_id).cloned()
        };

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.state()
            .polls
            .get_mut(job_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(PollStatus::Working))
    }

    async fn cleanup(&self, job_id: &JobId) -> Result<(), TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::Cleanup(job_id.clone()));
        state.cleanups.pop_front().unwrap_or(Ok(()))
    }

    async fn download(&self, job_id: &JobId) -> Result<Payload, TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::Download(job_id.clone()));
        state
            .downloads
            .get_mut(job_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(TransportError::Status(404, format!("no result for {job_id}"))))
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::ListTasks);
        Ok(state.tasks.clone())
    }
}
