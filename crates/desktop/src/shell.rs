//! Line-oriented shell: parses user input into tracker commands.

use std::io::{Stdout, Write};
use std::sync::Arc;

use jobwatch_core::JobId;
use jobwatch_feed::{Action, FeedCommand, MessageSource, SourceNotification};
use jobwatch_infra::{JobTracker, SubmitRequest, Submitted};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::console::ConsolePresenter;

pub const USAGE: &str = "\
commands:
  submit <group> <assignment>   request a new job
  download <job-id | #n>        save a finished job's result
  dismiss <job-id | #n>         close a notification
  dismiss-all                   close every notification that can be closed
  list                          show the notifications again
  resume                        pick up the server's active jobs
  help                          show this help
  quit                          leave";

/// What a command points at: a job id, or `#n` for the n-th listed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Job(JobId),
    Item(usize),
}

impl Target {
    fn parse(raw: &str) -> Result<Self, ShellError> {
        match raw.strip_prefix('#') {
            Some(n) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Self::Item(n)),
                _ => Err(ShellError::BadItem(raw.to_string())),
            },
            None => Ok(Self::Job(JobId::new(raw))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Submit(SubmitRequest),
    Download(Target),
    Dismiss(Target),
    DismissAll,
    List,
    Resume,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShellError {
    #[error("unknown command {0:?} (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("bad notification number {0:?}")]
    BadItem(String),
}

impl ShellCommand {
    /// Parse one input line; blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ShellError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Ok(None);
        };

        let command = match (name, args) {
            ("submit", [group, assignment]) => {
                Self::Submit(SubmitRequest::new(*group, *assignment))
            }
            ("submit", _) => return Err(ShellError::Usage("submit <group> <assignment>")),
            ("download", [target]) => Self::Download(Target::parse(target)?),
            ("download", _) => return Err(ShellError::Usage("download <job-id | #n>")),
            ("dismiss", [target]) => Self::Dismiss(Target::parse(target)?),
            ("dismiss", _) => return Err(ShellError::Usage("dismiss <job-id | #n>")),
            ("dismiss-all", []) => Self::DismissAll,
            ("list" | "ls", []) => Self::List,
            ("resume", []) => Self::Resume,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => return Err(ShellError::Unknown(line.trim().to_string())),
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Runs shell commands against a tracker.
///
/// Failures the user should see (a rejected request, a failed download) are
/// posted to the `messages` source so they show up in the feed until closed.
pub struct Shell<W: Write + Send = Stdout> {
    tracker: Arc<JobTracker>,
    console: Arc<ConsolePresenter<W>>,
    messages: Arc<MessageSource>,
}

impl<W: Write + Send> Shell<W> {
    pub fn new(
        tracker: Arc<JobTracker>,
        console: Arc<ConsolePresenter<W>>,
        messages: Arc<MessageSource>,
    ) -> Self {
        Self {
            tracker,
            console,
            messages,
        }
    }

    /// Read commands until `quit` or end of input, then stop polling.
    pub async fn run<R>(&self, input: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            match ShellCommand::parse(&line) {
                Ok(None) => {}
                Ok(Some(command)) => {
                    if self.execute(command).await == Flow::Quit {
                        break;
                    }
                }
                Err(e) => self.console.say(&e.to_string()),
            }
        }
        self.tracker.shutdown();
        Ok(())
    }

    pub async fn execute(&self, command: ShellCommand) -> Flow {
        tracing::debug!(?command, "shell command");
        match command {
            ShellCommand::Submit(request) => self.submit(&request).await,
            ShellCommand::Download(target) => self.download(target).await,
            ShellCommand::Dismiss(target) => self.dismiss(target).await,
            ShellCommand::DismissAll => {
                if let Err(e) = self.tracker.handle(FeedCommand::DismissAll).await {
                    self.console.say(&format!("dismiss-all failed: {e}"));
                }
            }
            ShellCommand::List => self.tracker.refresh(),
            ShellCommand::Resume => match self.tracker.resume().await {
                Ok(added) => self.console.say(&format!("resumed {added} job(s)")),
                Err(e) => self.post_error("resume", format!("Could not load active jobs: {e}")),
            },
            ShellCommand::Help => self.console.say(USAGE),
            ShellCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    async fn submit(&self, request: &SubmitRequest) {
        match self.tracker.submit(request).await {
            Ok(Submitted::Accepted(job_id)) => self.console.say(&format!("requested job {job_id}")),
            Ok(Submitted::Ready { title, saved_to }) => self.post(
                SourceNotification::message(
                    "saved",
                    format!("Saved {title} to {}.", saved_to.display()),
                ),
            ),
            Err(e) => self.post_error("submit", format!("Could not request the job: {e}")),
        }
    }

    fn action_at(&self, n: usize, close: bool) -> Option<Action> {
        let feed = self.tracker.feed();
        let notification = feed.notifications.get(n - 1)?;
        Some(if close {
            notification.on_close.clone()
        } else {
            notification.on_click.clone()
        })
    }

    async fn download(&self, target: Target) {
        let job_id = match target {
            Target::Job(job_id) => job_id,
            Target::Item(n) => match self.action_at(n, false) {
                Some(Action::Download { job_id }) => job_id,
                Some(Action::None) => return self.console.say(&format!("#{n} has nothing to download")),
                Some(other) => return self.forward(FeedCommand::Click(other)).await,
                None => return self.console.say(&format!("no notification #{n}")),
            },
        };

        match self.tracker.download(&job_id).await {
            Ok(path) => self.post(SourceNotification::message(
                "saved",
                format!("Saved to {}.", path.display()),
            )),
            Err(e) => self.post_error(
                &format!("download-{job_id}"),
                format!("Could not download job {job_id}: {e}"),
            ),
        }
    }

    async fn dismiss(&self, target: Target) {
        match target {
            Target::Job(job_id) => match self.tracker.dismiss(&job_id).await {
                Ok(true) => {}
                Ok(false) => self.console.say(&format!("job {job_id} is still computing")),
                Err(e) => self.console.say(&format!("cannot dismiss {job_id}: {e}")),
            },
            Target::Item(n) => match self.action_at(n, true) {
                Some(Action::None) => self.console.say(&format!("#{n} cannot be dismissed yet")),
                Some(action) => self.forward(FeedCommand::Close(action)).await,
                None => self.console.say(&format!("no notification #{n}")),
            },
        }
    }

    async fn forward(&self, command: FeedCommand) {
        if let Err(e) = self.tracker.handle(command).await {
            self.console.say(&e.to_string());
        }
    }

    fn post(&self, notification: SourceNotification) {
        self.messages.push(notification);
        self.tracker.refresh();
    }

    fn post_error(&self, key: &str, text: String) {
        tracing::warn!(key, "{text}");
        self.post(SourceNotification::message(key, text).with_error());
    }
}
