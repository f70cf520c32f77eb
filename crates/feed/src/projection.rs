//! Notification projector.
//!
//! A pure, synchronous transform from tracked jobs (newest first) and sibling
//! sources into a [`Feed`]. Re-run after every store mutation; calling it twice
//! on unchanged inputs yields an identical feed.

use std::sync::Arc;

use jobwatch_core::{Job, JobState};

use crate::notification::{Action, Feed, Notification};
use crate::source::NotificationSource;

/// Map one tracked job to its notification.
///
/// A pending job cannot be dismissed early: both of its handlers are no-ops.
pub fn job_notification(job: &Job) -> Notification {
    let job_id = job.id.clone();
    match job.state {
        JobState::Pending => Notification {
            text: format!("Computing the {}...", job.description),
            in_progress: true,
            error: false,
            on_click: Action::None,
            on_close: Action::None,
        },
        JobState::Completed => Notification {
            text: format!("The {} is ready.", job.description),
            in_progress: false,
            error: false,
            on_click: Action::Download {
                job_id: job_id.clone(),
            },
            on_close: Action::Remove { job_id },
        },
        JobState::Failed => Notification {
            text: format!("There was an error creating the {}.", job.description),
            in_progress: false,
            error: true,
            on_click: Action::None,
            on_close: Action::DismissFailed { job_id },
        },
    }
}

/// Project jobs and sibling sources into the displayable feed.
///
/// Job notifications come first, in the order given (the store hands them out
/// newest first). Each source's entries follow, sources in registration order.
pub fn project<'a, I>(jobs_newest_first: I, sources: &[Arc<dyn NotificationSource>]) -> Feed
where
    I: IntoIterator<Item = &'a Job>,
{
    let mut notifications: Vec<Notification> =
        jobs_newest_first.into_iter().map(job_notification).collect();

    for source in sources {
        let name = source.name();
        for entry in source.notifications() {
            let route = || Action::Source {
                source: name.to_string(),
                key: entry.key.clone(),
            };
            notifications.push(Notification {
                text: entry.text.clone(),
                in_progress: entry.in_progress,
                error: entry.error,
                on_click: if entry.clickable { route() } else { Action::None },
                // In-progress entries are never closable, whatever the source says.
                on_close: if entry.closable && !entry.in_progress {
                    route()
                } else {
                    Action::None
                },
            });
        }
    }

    Feed::new(notifications)
}
