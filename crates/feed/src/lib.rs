//! `jobwatch-feed`: the notification feed.
//!
//! This crate turns tracked jobs (plus any sibling notification sources) into
//! the ordered list a presenter renders, and fans rendered feeds out to
//! subscribers.
//!
//! - [`project`] is a pure function: same inputs, same [`Feed`].
//! - [`Presenter`] is the seam to whatever draws the feed.
//! - [`FeedBus`] is an in-memory presenter that broadcasts each feed.

pub mod bus;
pub mod notification;
pub mod presenter;
pub mod projection;
pub mod source;

pub use bus::{FeedBus, FeedBusError, Subscription};
pub use notification::{Action, Feed, FeedCommand, Notification};
pub use presenter::Presenter;
pub use projection::{job_notification, project};
pub use source::{MessageSource, NotificationSource, SourceNotification};
