//! Console presenter.

use std::io::{self, Stdout, Write};
use std::sync::Mutex;

use jobwatch_feed::{Feed, Notification, Presenter};

/// Draws the feed as a numbered list.
///
/// ```text
/// jobwatch: 1 ready
///   #1 [..] Computing the report...
///   #2 [ok] The grades is ready.
/// ```
pub struct ConsolePresenter<W = Stdout> {
    out: Mutex<W>,
}

impl ConsolePresenter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Print one line of shell output.
    pub fn say(&self, line: &str) {
        self.write(&format!("{line}\n"));
    }

    fn write(&self, text: &str) {
        let Ok(mut out) = self.out.lock() else {
            tracing::error!("console lock poisoned");
            return;
        };
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "failed to write to console");
        }
    }
}

impl ConsolePresenter<Vec<u8>> {
    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.out
            .lock()
            .map(|out| String::from_utf8_lossy(&out).into_owned())
            .unwrap_or_default()
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn render(&self, feed: &Feed) {
        self.write(&format_feed(feed));
    }
}

fn marker(notification: &Notification) -> &'static str {
    if notification.in_progress {
        "[..]"
    } else if notification.error {
        "[!!]"
    } else if !notification.on_click.is_none() {
        "[ok]"
    } else {
        "[--]"
    }
}

/// Render a feed as text.
pub fn format_feed(feed: &Feed) -> String {
    if feed.is_empty() {
        return "jobwatch: no notifications\n".to_string();
    }
    let mut text = format!("jobwatch: {} ready\n", feed.badge);
    for (i, notification) in feed.notifications.iter().enumerate() {
        text.push_str(&format!(
            "  #{} {} {}\n",
            i + 1,
            marker(notification),
            notification.text
        ));
    }
    text
}
