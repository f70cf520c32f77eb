//! Poller: drives status checks of pending jobs until they resolve.
//!
//! Each pending job gets one polling task. The task checks the job's status,
//! waits `check_every` after every "still working" answer, and stops once the
//! job resolves (done or failed) or disappears from the store.
//!
//! A dismissal cannot abort a status check already on the wire; the response
//! is still received, but the resolution it carries finds the job gone and
//! changes nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use jobwatch_core::JobId;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::types::PollPolicy;
use crate::transport::{PollStatus, Transport};

/// How a polled job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    Failed { reason: String },
}

/// Receiver of poll resolutions (the tracker).
pub trait PollSink: Send + Sync {
    /// Whether the job is still tracked and awaiting resolution.
    fn is_tracked(&self, job_id: &JobId) -> bool;

    /// Apply a resolution. Must be a no-op for jobs no longer tracked.
    fn resolve(&self, job_id: &JobId, resolution: Resolution);
}

/// Spawns and tracks polling tasks; at most one per job.
pub struct Poller {
    transport: Arc<dyn Transport>,
    policy: PollPolicy,
    active: Mutex<HashMap<JobId, AbortHandle>>,
}

impl Poller {
    pub fn new(transport: Arc<dyn Transport>, policy: PollPolicy) -> Self {
        Self {
            transport,
            policy,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling `job_id` unless a poll for it is already running.
    ///
    /// Returns `false` when a poll was already active. Must be called from
    /// within a tokio runtime.
    pub fn start(self: &Arc<Self>, job_id: JobId, sink: Weak<dyn PollSink>) -> bool {
        let Ok(mut active) = self.active.lock() else {
            tracing::error!(job_id = %job_id, "poll registry lock poisoned");
            return false;
        };

        if active.get(&job_id).is_some_and(|h| !h.is_finished()) {
            debug!(job_id = %job_id, "poll already active");
            return false;
        }

        let poller = Arc::clone(self);
        let task_id = job_id.clone();
        let handle = tokio::spawn(async move {
            poller.poll_until_resolved(&task_id, &sink).await;
            poller.finish(&task_id);
        });

        active.insert(job_id, handle.abort_handle());
        true
    }

    /// Whether a polling task for `job_id` is running.
    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.active
            .lock()
            .map(|active| active.get(job_id).is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Number of running polling tasks.
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .map(|active| active.values().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Abort every polling task (session teardown).
    pub fn abort_all(&self) {
        if let Ok(mut active) = self.active.lock() {
            for (job_id, handle) in active.drain() {
                debug!(job_id = %job_id, "aborting poll");
                handle.abort();
            }
        }
    }

    fn finish(&self, job_id: &JobId) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(job_id);
        }
    }

    async fn poll_until_resolved(&self, job_id: &JobId, sink: &Weak<dyn PollSink>) {
        let mut working = 0u32;

        loop {
            debug!(job_id = %job_id, attempt = working + 1, "checking job status");
            let outcome = self.transport.poll(job_id).await;

            // Tracker torn down while the check was in flight.
            let Some(target) = sink.upgrade() else {
                return;
            };

            match outcome {
                Ok(PollStatus::Done) => {
                    info!(job_id = %job_id, checks = working + 1, "job finished");
                    target.resolve(job_id, Resolution::Completed);
                    return;
                }
                Ok(PollStatus::Working) => {
                    working += 1;
                    if !self.policy.allows_another(working) {
                        warn!(job_id = %job_id, checks = working, "giving up on job");
                        target.resolve(
                            job_id,
                            Resolution::Failed {
                                reason: format!("still working after {working} checks"),
                            },
                        );
                        return;
                    }
                }
                Ok(PollStatus::Failed { status }) => {
                    warn!(job_id = %job_id, status, "job failed");
                    target.resolve(
                        job_id,
                        Resolution::Failed {
                            reason: format!("status {status}"),
                        },
                    );
                    return;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "job status check failed");
                    target.resolve(
                        job_id,
                        Resolution::Failed {
                            reason: e.to_string(),
                        },
                    );
                    return;
                }
            }

            if !target.is_tracked(job_id) {
                debug!(job_id = %job_id, "job no longer tracked; stopping poll");
                return;
            }
            drop(target);

            tokio::time::sleep(self.policy.delay_after(working)).await;

            let still_tracked = sink.upgrade().is_some_and(|t| t.is_tracked(job_id));
            if !still_tracked {
                debug!(job_id = %job_id, "job no longer tracked; stopping poll");
                return;
            }
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("policy", &self.policy)
            .field("active", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InMemoryTransport, TransportError};
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        tracked: Mutex<HashSet<JobId>>,
        resolved: Mutex<Vec<(JobId, Resolution)>>,
    }

    impl RecordingSink {
        fn tracking(ids: &[&str]) -> Arc<Self> {
            let sink = Self::default();
            sink.tracked
                .lock()
                .unwrap()
                .extend(ids.iter().map(|id| JobId::new(*id)));
            Arc::new(sink)
        }

        fn untrack(&self, id: &str) {
            self.tracked.lock().unwrap().remove(&JobId::new(id));
        }

        fn resolutions(&self) -> Vec<(JobId, Resolution)> {
            self.resolved.lock().unwrap().clone()
        }
    }

    impl PollSink for RecordingSink {
        fn is_tracked(&self, job_id: &JobId) -> bool {
            self.tracked.lock().unwrap().contains(job_id)
        }

        fn resolve(&self, job_id: &JobId, resolution: Resolution) {
            if self.is_tracked(job_id) {
                self.resolved.lock().unwrap().push((job_id.clone(), resolution));
            }
        }
    }

    fn weak(sink: &Arc<RecordingSink>) -> Weak<dyn PollSink> {
        let sink: Arc<dyn PollSink> = sink.clone();
        Arc::downgrade(&sink)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_second_until_done() {
        let transport = InMemoryTransport::arc();
        transport.script_polls(
            "J1",
            [
                Ok(PollStatus::Working),
                Ok(PollStatus::Working),
                Ok(PollStatus::Done),
            ],
        );
        let poller = Arc::new(Poller::new(transport.clone(), PollPolicy::default()));
        let sink = RecordingSink::tracking(&["J1"]);

        assert!(poller.start(JobId::new("J1"), weak(&sink)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.poll_count("J1"), 2);
        assert!(sink.resolutions().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.poll_count("J1"), 3);
        assert_eq!(
            sink.resolutions(),
            vec![(JobId::new("J1"), Resolution::Completed)]
        );
        assert!(!poller.is_polling(&JobId::new("J1")));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_for_same_job_is_rejected() {
        let transport = InMemoryTransport::arc();
        let poller = Arc::new(Poller::new(transport.clone(), PollPolicy::default()));
        let sink = RecordingSink::tracking(&["J1"]);

        assert!(poller.start(JobId::new("J1"), weak(&sink)));
        assert!(!poller.start(JobId::new("J1"), weak(&sink)));
        assert_eq!(poller.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        // One loop: checks at t=0, 1s, 2s.
        assert_eq!(transport.poll_count("J1"), 3);

        poller.abort_all();
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_and_unknown_status_fail_the_job() {
        let transport = InMemoryTransport::arc();
        transport.script_polls("J1", [Ok(PollStatus::Failed { status: 500 })]);
        transport.script_polls("J2", [Err(TransportError::Network("reset".to_string()))]);
        let poller = Arc::new(Poller::new(transport.clone(), PollPolicy::default()));
        let sink = RecordingSink::tracking(&["J1", "J2"]);

        poller.start(JobId::new("J1"), weak(&sink));
        poller.start(JobId::new("J2"), weak(&sink));
        tokio::time::sleep(Duration::from_secs(10)).await;

        let resolutions = sink.resolutions();
        assert_eq!(resolutions.len(), 2);
        assert!(
            resolutions
                .iter()
                .all(|(_, r)| matches!(r, Resolution::Failed { .. }))
        );
        // No further polling after a terminal answer.
        assert_eq!(transport.poll_count("J1"), 1);
        assert_eq!(transport.poll_count("J2"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_job_stops_polling() {
        let transport = InMemoryTransport::arc();
        let poller = Arc::new(Poller::new(transport.clone(), PollPolicy::default()));
        let sink = RecordingSink::tracking(&["J1"]);

        poller.start(JobId::new("J1"), weak(&sink));
        tokio::time::sleep(Duration::from_millis(500)).await;
        sink.untrack("J1");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.poll_count("J1"), 1);
        assert!(!poller.is_polling(&JobId::new("J1")));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_policy_gives_up() {
        let transport = InMemoryTransport::arc();
        let policy = PollPolicy::fixed(Duration::from_secs(1)).with_max_polls(3);
        let poller = Arc::new(Poller::new(transport.clone(), policy));
        let sink = RecordingSink::tracking(&["J1"]);

        poller.start(JobId::new("J1"), weak(&sink));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(transport.poll_count("J1"), 3);
        assert!(matches!(
            sink.resolutions().as_slice(),
            [(_, Resolution::Failed { .. })]
        ));
    }
}
