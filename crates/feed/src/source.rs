//! Sibling notification sources.
//!
//! The job tracker is not the only thing that produces notifications; other
//! parts of a client (system messages, transient errors) contribute entries to
//! the same feed. A source hands the projector a snapshot of its entries and
//! receives the clicks routed back to it.

use std::sync::Mutex;

/// One entry contributed by a sibling source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNotification {
    /// Source-local key, echoed back on click/close.
    pub key: String,
    pub text: String,
    pub in_progress: bool,
    pub error: bool,
    pub clickable: bool,
    pub closable: bool,
}

impl SourceNotification {
    /// A closable, non-clickable message.
    pub fn message(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
            in_progress: false,
            error: false,
            clickable: false,
            closable: true,
        }
    }

    pub fn with_error(mut self) -> Self {
        self.error = true;
        self
    }
}

/// A provider of notifications that share the feed with tracked jobs.
pub trait NotificationSource: Send + Sync {
    /// Stable name used to route clicks back to this source.
    fn name(&self) -> &str;

    /// Current entries, in display order.
    fn notifications(&self) -> Vec<SourceNotification>;

    /// Body click on one of this source's entries.
    fn on_click(&self, _key: &str) {}

    /// Close click on one of this source's entries.
    fn on_close(&self, key: &str);
}

/// In-memory message list (transient errors, info banners).
///
/// Entries stay until closed.
#[derive(Debug)]
pub struct MessageSource {
    name: String,
    entries: Mutex<Vec<SourceNotification>>,
}

impl MessageSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Add an entry; an existing entry with the same key is replaced in place.
    pub fn push(&self, entry: SourceNotification) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::error!(source = %self.name, "message source lock poisoned");
            return;
        };
        match entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSource for MessageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn notifications(&self) -> Vec<SourceNotification> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(e) => {
                tracing::error!(source = %self.name, "message source lock poisoned: {e}");
                Vec::new()
            }
        }
    }

    fn on_close(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|e| e.key != key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_replaces_same_key() {
        let source = MessageSource::new("messages");
        source.push(SourceNotification::message("a", "first"));
        source.push(SourceNotification::message("b", "second"));
        source.push(SourceNotification::message("a", "first again"));

        let texts: Vec<_> = source.notifications().into_iter().map(|n| n.text).collect();
        assert_eq!(texts, vec!["first again", "second"]);
    }

    #[test]
    fn close_removes_entry() {
        let source = MessageSource::new("messages");
        source.push(SourceNotification::message("a", "hello").with_error());
        assert_eq!(source.len(), 1);

        source.on_close("a");
        assert!(source.is_empty());

        // Unknown keys are ignored.
        source.on_close("missing");
        assert!(source.is_empty());
    }
}
