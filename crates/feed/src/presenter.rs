//! Presenter seam.

use crate::notification::Feed;

/// Renders the projected feed.
///
/// Called synchronously after every store mutation, so implementations must
/// not block (queue, print, or hand off).
pub trait Presenter: Send + Sync {
    fn render(&self, feed: &Feed);
}

impl<P> Presenter for std::sync::Arc<P>
where
    P: Presenter + ?Sized,
{
    fn render(&self, feed: &Feed) {
        (**self).render(feed)
    }
}
