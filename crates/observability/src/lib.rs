//! Tracing/logging setup shared by the jobwatch binaries.

pub use crate::tracing::{LogFormat, LogSettings};

/// Initialize process-wide logging with the defaults (JSON, `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(&LogSettings::default());
}

/// Initialize process-wide logging with explicit settings.
pub fn init_with(settings: &LogSettings) {
    tracing::init(settings);
}

/// Tracing configuration (filters, format).
pub mod tracing;
