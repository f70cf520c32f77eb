//! In-memory feed fan-out.
//!
//! `FeedBus` is a [`Presenter`] that publishes every rendered [`Feed`] to any
//! number of subscribers. It lets several views (a badge, a dropdown, a test
//! recorder) consume the same feed without the tracker knowing about them.
//!
//! - No IO / no async
//! - Best-effort fan-out; dead subscribers are dropped on publish
//! - Each subscriber sees feeds in render order

use std::sync::{Mutex, mpsc};
use std::time::Duration;

use crate::notification::Feed;
use crate::presenter::Presenter;

#[derive(Debug, thiserror::Error)]
pub enum FeedBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("feed bus lock poisoned")]
    Poisoned,
}

/// A subscription to rendered feeds.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Feed>,
}

impl Subscription {
    fn new(receiver: mpsc::Receiver<Feed>) -> Self {
        Self { receiver }
    }

    /// Try to receive a feed without blocking.
    pub fn try_recv(&self) -> Result<Feed, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a feed.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Feed, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything published so far.
    pub fn drain(&self) -> Vec<Feed> {
        self.receiver.try_iter().collect()
    }

    /// The most recent feed published so far, if any.
    pub fn latest(&self) -> Option<Feed> {
        self.receiver.try_iter().last()
    }
}

/// In-memory pub/sub of rendered feeds.
#[derive(Debug, Default)]
pub struct FeedBus {
    subscribers: Mutex<Vec<mpsc::Sender<Feed>>>,
}

impl FeedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, feed: &Feed) -> Result<(), FeedBusError> {
        let mut subs = self.subscribers.lock().map_err(|_| FeedBusError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(feed.clone()).is_ok());

        Ok(())
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive feeds.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Presenter for FeedBus {
    fn render(&self, feed: &Feed) {
        if let Err(e) = self.publish(feed) {
            tracing::error!("failed to publish feed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Action, Notification};

    fn feed(text: &str) -> Feed {
        Feed::new(vec![Notification {
            text: text.to_string(),
            in_progress: false,
            error: false,
            on_click: Action::None,
            on_close: Action::None,
        }])
    }

    #[test]
    fn fans_out_to_every_subscriber() {
        let bus = FeedBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.render(&feed("one"));
        bus.render(&feed("two"));

        assert_eq!(a.drain().len(), 2);
        assert_eq!(b.latest().unwrap().texts(), vec!["two"]);
    }

    #[test]
    fn subscriber_on_another_thread_waits_for_feed() {
        let bus = std::sync::Arc::new(FeedBus::new());
        let sub = bus.subscribe();

        let publisher = std::sync::Arc::clone(&bus);
        let handle = std::thread::spawn(move || publisher.render(&feed("late")));

        let received = sub.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(received.texts(), vec!["late"]);

        assert!(matches!(
            sub.recv_timeout(Duration::from_millis(10)),
            Err(mpsc::RecvTimeoutError::Timeout)
        ));
    }

    #[test]
    fn dead_subscribers_are_dropped() {
        let bus = FeedBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(&feed("x")).unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
