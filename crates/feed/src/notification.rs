//! Notification view objects.

use serde::Serialize;

use jobwatch_core::JobId;

/// What a click (or close click) on a notification asks the tracker to do.
///
/// Handlers are plain data so a presenter can hold and forward them without
/// borrowing the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Nothing happens.
    None,
    /// Fetch the result of a completed job and hand it to the file saver.
    Download { job_id: JobId },
    /// Drop a completed job from the feed.
    Remove { job_id: JobId },
    /// Ask the server to clean up a failed job, then drop it from the feed.
    DismissFailed { job_id: JobId },
    /// Routed back to a sibling notification source.
    Source { source: String, key: String },
}

impl Action {
    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }
}

/// A derived, displayable notification. Never stored; recomputed on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub text: String,
    pub in_progress: bool,
    pub error: bool,
    pub on_click: Action,
    pub on_close: Action,
}

/// Projected notification list plus the badge count derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Feed {
    pub notifications: Vec<Notification>,
    /// Items ready for user attention (not in progress).
    pub badge: usize,
}

impl Feed {
    pub fn new(notifications: Vec<Notification>) -> Self {
        let badge = Self::badge_count(&notifications);
        Self {
            notifications,
            badge,
        }
    }

    /// Count of notifications that are not in progress.
    pub fn badge_count(notifications: &[Notification]) -> usize {
        notifications.iter().filter(|n| !n.in_progress).count()
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.notifications.iter().map(|n| n.text.as_str()).collect()
    }
}

/// A user interaction forwarded by the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// The notification body was clicked.
    Click(Action),
    /// The notification's close button was clicked.
    Close(Action),
    /// "Dismiss all": run every projected close handler.
    DismissAll,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feed_serializes_for_web_presenters() {
        let feed = Feed::new(vec![Notification {
            text: "The report is ready.".to_string(),
            in_progress: false,
            error: false,
            on_click: Action::Download {
                job_id: JobId::new("J1"),
            },
            on_close: Action::Remove {
                job_id: JobId::new("J1"),
            },
        }]);

        assert_eq!(
            serde_json::to_value(&feed).unwrap(),
            json!({
                "notifications": [{
                    "text": "The report is ready.",
                    "in_progress": false,
                    "error": false,
                    "on_click": {"kind": "download", "job_id": "J1"},
                    "on_close": {"kind": "remove", "job_id": "J1"},
                }],
                "badge": 1,
            })
        );
        assert_eq!(serde_json::to_value(Action::None).unwrap(), json!({"kind": "none"}));
    }

    #[test]
    fn badge_counts_items_not_in_progress() {
        let pending = Notification {
            text: "Computing the report...".to_string(),
            in_progress: true,
            error: false,
            on_click: Action::None,
            on_close: Action::None,
        };
        let failed = Notification {
            text: "There was an error creating the roster.".to_string(),
            in_progress: false,
            error: true,
            ..pending.clone()
        };

        let feed = Feed::new(vec![pending, failed]);
        assert_eq!(feed.badge, 1);
        assert_eq!(feed.len(), 2);
    }
}
