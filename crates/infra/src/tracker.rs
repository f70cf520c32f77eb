//! The job tracker: store + poller + projection, wired to the collaborators.
//!
//! Control flow:
//!
//! ```text
//! submit ─► Transport ─┬─ Ready ────► FileSaver
//!                      └─ Accepted ─► store (Pending) ─► Poller ─► store (Completed | Failed)
//!                                          │
//!              every mutation ─► project ─► Presenter
//! ```
//!
//! The store is owned here; the presenter never touches it and only raises
//! [`FeedCommand`]s that the tracker interprets.

use std::path::PathBuf;
use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, Utc};
use jobwatch_core::{Job, JobId, JobState};
use jobwatch_feed::{Action, Feed, FeedCommand, NotificationSource, Presenter, project};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::external::{FileSaver, SaveError};
use crate::jobs::{
    InMemoryJobStore, JobStats, JobStore, JobStoreError, PollPolicy, PollSink, Poller, Resolution,
    Transition,
};
use crate::transport::{HttpTransport, SubmitOutcome, SubmitRequest, TaskRecord, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("job request rejected: {0}")]
    Rejected(TransportError),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {job_id} is {actual}, expected {expected}")]
    InvalidState {
        job_id: JobId,
        actual: JobState,
        expected: JobState,
    },
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("save failed: {0}")]
    Save(#[from] SaveError),
    #[error("store error: {0}")]
    Store(#[from] JobStoreError),
}

/// What a submit turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    /// The result was ready inline and has been saved; nothing is tracked.
    Ready { title: String, saved_to: PathBuf },
    /// A pending job is now tracked and polled.
    Accepted(JobId),
}

struct Shared {
    store: Arc<dyn JobStore>,
    transport: Arc<dyn Transport>,
    presenter: Arc<dyn Presenter>,
    saver: Arc<dyn FileSaver>,
    sources: RwLock<Vec<Arc<dyn NotificationSource>>>,
    poller: Arc<Poller>,
}

impl Shared {
    fn sources(&self) -> Vec<Arc<dyn NotificationSource>> {
        match self.sources.read() {
            Ok(sources) => sources.clone(),
            Err(e) => {
                error!("notification sources lock poisoned: {e}");
                Vec::new()
            }
        }
    }

    fn feed(&self) -> Feed {
        let jobs = match self.store.list_newest_first() {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed to list tracked jobs");
                Vec::new()
            }
        };
        project(&jobs, &self.sources())
    }

    /// Re-project and hand the feed to the presenter.
    fn publish(&self) {
        let feed = self.feed();
        debug!(notifications = feed.len(), badge = feed.badge, "rendering feed");
        self.presenter.render(&feed);
    }

    fn mark_completed(&self, job_id: &JobId) -> Result<Transition, JobStoreError> {
        let transition = self.store.mark_completed(job_id)?;
        self.after_transition(job_id, transition, JobState::Completed);
        Ok(transition)
    }

    fn mark_failed(&self, job_id: &JobId) -> Result<Transition, JobStoreError> {
        let transition = self.store.mark_failed(job_id)?;
        self.after_transition(job_id, transition, JobState::Failed);
        Ok(transition)
    }

    fn after_transition(&self, job_id: &JobId, transition: Transition, to: JobState) {
        match transition {
            Transition::Applied => {
                info!(job_id = %job_id, state = %to, "job resolved");
                self.publish();
            }
            Transition::Missing => {
                warn!(job_id = %job_id, state = %to, "job no longer tracked; transition ignored");
            }
            Transition::AlreadyTerminal(state) => {
                warn!(job_id = %job_id, current = %state, requested = %to, "job already resolved; transition ignored");
            }
        }
    }

    fn remove(&self, job_id: &JobId) -> Result<Option<Job>, JobStoreError> {
        let removed = self.store.remove(job_id)?;
        match &removed {
            Some(job) => {
                info!(job_id = %job_id, state = %job.state, "job removed");
                self.publish();
            }
            None => debug!(job_id = %job_id, "remove: job not tracked"),
        }
        Ok(removed)
    }
}

impl PollSink for Shared {
    fn is_tracked(&self, job_id: &JobId) -> bool {
        matches!(self.store.get(job_id), Ok(Some(job)) if job.is_pending())
    }

    fn resolve(&self, job_id: &JobId, resolution: Resolution) {
        let result = match resolution {
            Resolution::Completed => self.mark_completed(job_id),
            Resolution::Failed { reason } => {
                debug!(job_id = %job_id, reason = %reason, "marking job failed");
                self.mark_failed(job_id)
            }
        };
        if let Err(e) = result {
            error!(job_id = %job_id, error = %e, "failed to apply poll resolution");
        }
    }
}

/// Asynchronous job tracking engine.
///
/// One instance per session. Dropping it (or calling [`JobTracker::shutdown`])
/// stops every polling task.
pub struct JobTracker {
    shared: Arc<Shared>,
}

impl JobTracker {
    /// Create a tracker with an in-memory store and the default poll policy.
    pub fn new(
        transport: Arc<dyn Transport>,
        presenter: Arc<dyn Presenter>,
        saver: Arc<dyn FileSaver>,
    ) -> Self {
        Self::with_parts(
            InMemoryJobStore::arc(),
            transport,
            presenter,
            saver,
            PollPolicy::default(),
        )
    }

    /// Create a tracker from explicit parts.
    pub fn with_parts(
        store: Arc<dyn JobStore>,
        transport: Arc<dyn Transport>,
        presenter: Arc<dyn Presenter>,
        saver: Arc<dyn FileSaver>,
        policy: PollPolicy,
    ) -> Self {
        let poller = Arc::new(Poller::new(Arc::clone(&transport), policy));
        Self {
            shared: Arc::new(Shared {
                store,
                transport,
                presenter,
                saver,
                sources: RwLock::new(Vec::new()),
                poller,
            }),
        }
    }

    /// Create a tracker talking HTTP to the configured API.
    pub fn from_config(
        config: &ClientConfig,
        presenter: Arc<dyn Presenter>,
        saver: Arc<dyn FileSaver>,
    ) -> Self {
        Self::with_parts(
            InMemoryJobStore::arc(),
            Arc::new(HttpTransport::from_config(config)),
            presenter,
            saver,
            config.poll.clone(),
        )
    }

    /// Register a sibling notification source and re-project.
    pub fn add_source(&self, source: Arc<dyn NotificationSource>) {
        match self.shared.sources.write() {
            Ok(mut sources) => sources.push(source),
            Err(e) => {
                error!("notification sources lock poisoned: {e}");
                return;
            }
        }
        self.shared.publish();
    }

    /// Re-project after a sibling source changed.
    pub fn refresh(&self) {
        self.shared.publish();
    }

    /// Current projected feed.
    pub fn feed(&self) -> Feed {
        self.shared.feed()
    }

    /// Tracked jobs, newest first.
    pub fn jobs(&self) -> Vec<Job> {
        self.shared.store.list_newest_first().unwrap_or_else(|e| {
            error!(error = %e, "failed to list tracked jobs");
            Vec::new()
        })
    }

    pub fn job(&self, job_id: &JobId) -> Option<Job> {
        self.shared.store.get(job_id).ok().flatten()
    }

    pub fn stats(&self) -> Result<JobStats, TrackerError> {
        Ok(self.shared.store.stats()?)
    }

    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.shared.poller.is_polling(job_id)
    }

    /// Request a new job.
    ///
    /// A rejection creates nothing and is returned once to the caller; it is
    /// not retried.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<Submitted, TrackerError> {
        let outcome = match self.shared.transport.submit(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    group_id = %request.group_id,
                    assignment_id = %request.assignment_id,
                    error = %e,
                    "job request rejected"
                );
                return Err(TrackerError::Rejected(e));
            }
        };

        match outcome {
            SubmitOutcome::Ready(payload) => {
                info!(title = %payload.title, "job result ready inline");
                let saved_to = self.shared.saver.save(&payload).await.inspect_err(|e| {
                    warn!(title = %payload.title, error = %e, "failed to save inline result");
                })?;
                Ok(Submitted::Ready {
                    title: payload.title,
                    saved_to,
                })
            }
            SubmitOutcome::Accepted(record) => {
                let job_id = record.id.clone();
                self.track(record.into_job())?;
                Ok(Submitted::Accepted(job_id))
            }
        }
    }

    /// Insert a job and start polling it if it is still pending.
    fn track(&self, job: Job) -> Result<(), TrackerError> {
        let job_id = job.id.clone();
        let pending = job.is_pending();

        match self.shared.store.insert(job) {
            Ok(()) => {
                info!(job_id = %job_id, pending, "tracking job");
                self.shared.publish();
            }
            Err(JobStoreError::AlreadyExists(_)) => {
                warn!(job_id = %job_id, "job already tracked");
            }
            Err(e) => return Err(e.into()),
        }

        if pending {
            self.start_polling(&job_id);
        }
        Ok(())
    }

    fn start_polling(&self, job_id: &JobId) {
        let shared: Arc<dyn PollSink> = self.shared.clone();
        let sink: Weak<dyn PollSink> = Arc::downgrade(&shared);
        let tracked_pending = self
            .job(job_id)
            .is_some_and(|job| job.state == JobState::Pending);
        if tracked_pending {
            self.shared.poller.start(job_id.clone(), sink);
        }
    }

    /// Rehydrate from the server's active tasks (page load / reconnect).
    ///
    /// Unknown tasks are inserted oldest first so the newest ends up on top;
    /// every pending one is polled. Returns the number of tasks added.
    pub async fn resume(&self) -> Result<usize, TrackerError> {
        let listed = self.shared.transport.list_tasks().await.inspect_err(|e| {
            warn!(error = %e, "failed to list active tasks");
        })?;

        // Undated tasks share one timestamp and keep their listing order.
        let now = Utc::now();
        let mut tasks: Vec<(DateTime<Utc>, TaskRecord)> = listed
            .into_iter()
            .map(|task| (task.created_at_or(now), task))
            .collect();
        tasks.sort_by_key(|(created_at, _)| *created_at);

        let mut added = 0;
        for (created_at, task) in tasks {
            if self.shared.store.contains(&task.id)? {
                // Already tracked; make sure a pending one is being polled.
                self.start_polling(&task.id);
                continue;
            }
            self.track(task.into_job_at(created_at))?;
            added += 1;
        }

        info!(added, "resumed active tasks");
        Ok(added)
    }

    /// Transition a tracked job to `Completed`. No-op if it is gone.
    pub fn mark_completed(&self, job_id: &JobId) -> Result<Transition, TrackerError> {
        Ok(self.shared.mark_completed(job_id)?)
    }

    /// Transition a tracked job to `Failed`. No-op if it is gone.
    pub fn mark_failed(&self, job_id: &JobId) -> Result<Transition, TrackerError> {
        Ok(self.shared.mark_failed(job_id)?)
    }

    /// Drop a job from the store, whatever its state.
    ///
    /// A poll still in flight for it will find it gone and change nothing.
    pub fn remove(&self, job_id: &JobId) -> Result<Option<Job>, TrackerError> {
        Ok(self.shared.remove(job_id)?)
    }

    fn require(&self, job_id: &JobId, expected: JobState) -> Result<Job, TrackerError> {
        let job = self
            .shared
            .store
            .get(job_id)?
            .ok_or_else(|| TrackerError::NotFound(job_id.clone()))?;
        if job.state != expected {
            return Err(TrackerError::InvalidState {
                job_id: job_id.clone(),
                actual: job.state,
                expected,
            });
        }
        Ok(job)
    }

    /// Fetch a completed job's result, save it, and stop tracking the job.
    ///
    /// On failure the job stays `Completed` so the user can retry.
    pub async fn download(&self, job_id: &JobId) -> Result<PathBuf, TrackerError> {
        let job = self.require(job_id, JobState::Completed)?;

        let payload = self.shared.transport.download(job_id).await.inspect_err(|e| {
            warn!(job_id = %job_id, error = %e, "download failed; job kept for retry");
        })?;

        let saved_to = self.shared.saver.save(&payload).await.inspect_err(|e| {
            warn!(job_id = %job_id, error = %e, "saving download failed; job kept for retry");
        })?;

        info!(job_id = %job_id, description = %job.description, path = %saved_to.display(), "job downloaded");
        self.shared.remove(job_id)?;
        Ok(saved_to)
    }

    /// Ask the server to clean up a failed job, then drop it.
    ///
    /// The job is removed even when cleanup fails, so the feed never gets
    /// stuck; client and server may then disagree about the job.
    pub async fn dismiss_failed(&self, job_id: &JobId) -> Result<(), TrackerError> {
        self.require(job_id, JobState::Failed)?;

        if let Err(e) = self.shared.transport.cleanup(job_id).await {
            warn!(job_id = %job_id, error = %e, "failed job cleanup failed; removing anyway");
        }

        self.shared.remove(job_id)?;
        Ok(())
    }

    /// Close a job the way its notification's close button would.
    ///
    /// Completed jobs are removed, failed ones cleaned up and removed. A
    /// pending job cannot be dismissed; returns `false` and changes nothing.
    pub async fn dismiss(&self, job_id: &JobId) -> Result<bool, TrackerError> {
        let job = self
            .shared
            .store
            .get(job_id)?
            .ok_or_else(|| TrackerError::NotFound(job_id.clone()))?;
        match job.state {
            JobState::Pending => {
                debug!(job_id = %job_id, "pending job cannot be dismissed");
                Ok(false)
            }
            JobState::Completed => Ok(self.shared.remove(job_id)?.is_some()),
            JobState::Failed => {
                self.dismiss_failed(job_id).await?;
                Ok(true)
            }
        }
    }

    /// Run the command a presenter forwarded.
    pub async fn handle(&self, command: FeedCommand) -> Result<(), TrackerError> {
        match command {
            FeedCommand::Click(action) => self.run_action(&action, false).await,
            FeedCommand::Close(action) => self.run_action(&action, true).await,
            FeedCommand::DismissAll => {
                self.dismiss_all().await;
                Ok(())
            }
        }
    }

    /// Invoke the close handler of every projected notification.
    ///
    /// Failures are logged and do not stop the remaining handlers. Returns
    /// how many handlers ran.
    pub async fn dismiss_all(&self) -> usize {
        let feed = self.feed();
        let mut ran = 0;
        for notification in &feed.notifications {
            if notification.on_close.is_none() {
                continue;
            }
            ran += 1;
            if let Err(e) = self.run_action(&notification.on_close, true).await {
                warn!(text = %notification.text, error = %e, "dismiss failed");
            }
        }
        info!(dismissed = ran, "dismissed all notifications");
        ran
    }

    async fn run_action(&self, action: &Action, close: bool) -> Result<(), TrackerError> {
        match action {
            Action::None => Ok(()),
            Action::Download { job_id } => self.download(job_id).await.map(|_| ()),
            Action::Remove { job_id } => self.remove(job_id).map(|_| ()),
            Action::DismissFailed { job_id } => self.dismiss_failed(job_id).await,
            Action::Source { source, key } => {
                let target = self
                    .shared
                    .sources()
                    .into_iter()
                    .find(|s| s.name() == source.as_str());
                match target {
                    Some(target) if close => target.on_close(key),
                    Some(target) => target.on_click(key),
                    None => warn!(source = %source, key = %key, "unknown notification source"),
                }
                self.shared.publish();
                Ok(())
            }
        }
    }

    /// Stop every polling task. Tracked jobs are kept.
    pub fn shutdown(&self) {
        self.shared.poller.abort_all();
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("poller", &self.shared.poller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::MemorySaver;
    use crate::transport::InMemoryTransport;
    use jobwatch_feed::FeedBus;

    fn tracker() -> (JobTracker, Arc<InMemoryTransport>) {
        let transport = InMemoryTransport::arc();
        let tracker = JobTracker::new(
            transport.clone(),
            Arc::new(FeedBus::new()),
            Arc::new(MemorySaver::new()),
        );
        (tracker, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_on_missing_job_are_noops() {
        let (tracker, _) = tracker();
        let id = JobId::new("gone");

        assert_eq!(tracker.mark_completed(&id).unwrap(), Transition::Missing);
        assert_eq!(tracker.mark_failed(&id).unwrap(), Transition::Missing);
        assert!(tracker.remove(&id).unwrap().is_none());
        assert!(tracker.feed().is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stale_resolution_is_logged_as_warning() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let (tracker, _) = tracker();
        tracing::subscriber::with_default(subscriber, || {
            tracker.mark_completed(&JobId::new("gone")).unwrap();
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("job no longer tracked"), "{logs}");
        assert!(logs.contains("gone"), "{logs}");
    }

    #[tokio::test(start_paused = true)]
    async fn commands_check_job_state() {
        let (tracker, transport) = tracker();
        transport.accept_next("J1", "Report");
        tracker.submit(&SubmitRequest::new("G1", "A1")).await.unwrap();
        let id = JobId::new("J1");

        let err = tracker.download(&id).await.unwrap_err();
        assert!(matches!(
            err,
            TrackerError::InvalidState {
                actual: JobState::Pending,
                expected: JobState::Completed,
                ..
            }
        ));

        let err = tracker.dismiss_failed(&id).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidState { .. }));

        let err = tracker.download(&JobId::new("nope")).await.unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));

        // Neither reached the transport.
        assert_eq!(transport.download_count("J1"), 0);
        assert_eq!(transport.cleanup_count("J1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_dispatches_on_state() {
        let (tracker, transport) = tracker();
        transport.accept_next("J1", "Report");
        transport.accept_next("J2", "Roster");
        tracker.submit(&SubmitRequest::new("G1", "A1")).await.unwrap();
        tracker.submit(&SubmitRequest::new("G1", "A2")).await.unwrap();
        let (j1, j2) = (JobId::new("J1"), JobId::new("J2"));

        assert!(!tracker.dismiss(&j1).await.unwrap());
        assert!(tracker.job(&j1).is_some());

        tracker.mark_completed(&j1).unwrap();
        tracker.mark_failed(&j2).unwrap();
        assert!(tracker.dismiss(&j1).await.unwrap());
        assert!(tracker.dismiss(&j2).await.unwrap());

        assert!(tracker.jobs().is_empty());
        assert_eq!(transport.cleanup_count("J2"), 1);
        assert!(matches!(
            tracker.dismiss(&j1).await,
            Err(TrackerError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_failure_stops_polling() {
        let (tracker, transport) = tracker();
        transport.accept_next("J1", "Report");
        tracker.submit(&SubmitRequest::new("G1", "A1")).await.unwrap();
        let id = JobId::new("J1");

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert!(tracker.is_polling(&id));

        assert!(tracker.mark_failed(&id).unwrap().is_applied());
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        assert!(!tracker.is_polling(&id));
        assert_eq!(transport.poll_count("J1"), 1);
        assert_eq!(tracker.job(&id).map(|j| j.state), Some(JobState::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_polls_but_keeps_jobs() {
        let (tracker, transport) = tracker();
        transport.accept_next("J1", "Report");
        transport.accept_next("J2", "Roster");
        tracker.submit(&SubmitRequest::new("G1", "A1")).await.unwrap();
        tracker.submit(&SubmitRequest::new("G1", "A2")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        tracker.shutdown();
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        assert_eq!(transport.poll_count("J1"), 1);
        assert_eq!(transport.poll_count("J2"), 1);
        assert_eq!(tracker.jobs().len(), 2);
        assert_eq!(tracker.stats().unwrap().pending, 2);
    }
}
