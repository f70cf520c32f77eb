//! `jobwatch-desktop`
//!
//! **Responsibility:** Terminal client for the job tracker.
//!
//! This crate provides:
//! - A console presenter that draws the notification feed
//! - A file saver writing downloaded results to the download directory
//! - A line-oriented shell turning user input into tracker commands
//!
//! The client is a **thin shell** around `jobwatch-infra`'s `JobTracker`.

pub mod console;
pub mod saver;
pub mod shell;

pub use console::ConsolePresenter;
pub use saver::DirectorySaver;
pub use shell::{Flow, Shell, ShellCommand, ShellError};
