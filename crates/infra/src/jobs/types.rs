//! Poll policy and store transition results.

use std::time::Duration;

use jobwatch_core::JobState;

/// Default delay between two status checks of a pending job.
pub const CHECK_EVERY: Duration = Duration::from_secs(1);

/// How the delay between status checks evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay before every check.
    Fixed,
    /// `check_every * 2^(n-1)`, capped at `max_delay`.
    Exponential { max_delay: Duration },
}

/// Status-check policy for pending jobs.
///
/// The default polls every [`CHECK_EVERY`] forever: a job that never resolves
/// is polled until it is removed or the tracker shuts down. A bounded or
/// exponential policy is an opt-in deviation from that; when `max_polls` is
/// exhausted the job is marked failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub check_every: Duration,
    pub strategy: BackoffStrategy,
    /// Maximum number of "still working" answers before giving up (None = unbounded).
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(CHECK_EVERY)
    }
}

impl PollPolicy {
    /// Fixed delay, unbounded.
    pub fn fixed(check_every: Duration) -> Self {
        Self {
            check_every,
            strategy: BackoffStrategy::Fixed,
            max_polls: None,
        }
    }

    /// Exponential delay starting at `check_every`, unbounded unless
    /// combined with [`PollPolicy::with_max_polls`].
    pub fn exponential(check_every: Duration, max_delay: Duration) -> Self {
        Self {
            check_every,
            strategy: BackoffStrategy::Exponential { max_delay },
            max_polls: None,
        }
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    /// Delay to wait after the `working`-th "still working" answer (1-indexed).
    pub fn delay_after(&self, working: u32) -> Duration {
        if working == 0 {
            return Duration::ZERO;
        }
        match self.strategy {
            BackoffStrategy::Fixed => self.check_every,
            BackoffStrategy::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(working - 1);
                self.check_every.saturating_mul(factor).min(max_delay)
            }
        }
    }

    /// Whether another check may follow the `working`-th "still working" answer.
    pub fn allows_another(&self, working: u32) -> bool {
        self.max_polls.is_none_or(|max| working < max)
    }
}

/// Outcome of a state transition request against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The job moved to the requested state.
    Applied,
    /// No such job (dismissed concurrently); nothing changed.
    Missing,
    /// The job was already terminal; nothing changed.
    AlreadyTerminal(JobState),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}
