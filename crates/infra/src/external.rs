//! External collaborators the tracker is wired to.
//!
//! - [`Presenter`] draws the feed (re-exported from `jobwatch-feed`)
//! - [`FileSaver`] takes a downloaded result and stores it for the user

use std::path::PathBuf;
use std::sync::Mutex;

pub use jobwatch_feed::Presenter;

use crate::transport::Payload;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("saver lock poisoned")]
    Poisoned,
}

/// "Save as file" collaborator.
#[async_trait::async_trait]
pub trait FileSaver: Send + Sync {
    /// Store the payload; returns where it went.
    async fn save(&self, payload: &Payload) -> Result<PathBuf, SaveError>;
}

/// Keeps saved payloads in memory (tests/dev).
#[derive(Debug, Default)]
pub struct MemorySaver {
    saved: Mutex<Vec<Payload>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<Payload> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl FileSaver for MemorySaver {
    async fn save(&self, payload: &Payload) -> Result<PathBuf, SaveError> {
        if payload.title.is_empty() {
            return Err(SaveError::InvalidName(payload.title.clone()));
        }
        let mut saved = self.saved.lock().map_err(|_| SaveError::Poisoned)?;
        saved.push(payload.clone());
        Ok(PathBuf::from(&payload.title))
    }
}
