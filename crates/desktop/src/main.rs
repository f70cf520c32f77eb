//! `jobwatch`: terminal client for the asynchronous job API.
//!
//! Configuration comes from the environment (`JOBWATCH_API_URL`,
//! `JOBWATCH_AUTH_TOKEN`, ...); logs go to stderr, the feed to stdout.

use std::sync::Arc;

use anyhow::Context;
use jobwatch_desktop::{ConsolePresenter, DirectorySaver, Shell};
use jobwatch_feed::{MessageSource, SourceNotification};
use jobwatch_infra::{ClientConfig, JobTracker};
use jobwatch_observability::{LogFormat, LogSettings};
use tokio::io::BufReader;

const LOG_FORMAT: &str = "JOBWATCH_LOG_FORMAT";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let format = std::env::var(LOG_FORMAT)
        .ok()
        .and_then(|raw| LogFormat::parse(&raw))
        .unwrap_or(LogFormat::Compact);
    jobwatch_observability::init_with(&LogSettings {
        format,
        default_filter: "warn".to_string(),
    });

    let config = ClientConfig::from_env().context("invalid configuration")?;
    let saver = DirectorySaver::from_config(&config)?;
    tracing::info!(
        api_url = %config.api_url,
        authenticated = config.auth_token.is_some(),
        download_dir = %saver.dir().display(),
        "starting jobwatch"
    );

    let console = Arc::new(ConsolePresenter::stdout());
    let tracker = Arc::new(JobTracker::from_config(
        &config,
        console.clone(),
        Arc::new(saver),
    ));
    let messages = Arc::new(MessageSource::new("messages"));
    tracker.add_source(messages.clone());

    if let Err(e) = tracker.resume().await {
        messages.push(
            SourceNotification::message("resume", format!("Could not load active jobs: {e}"))
                .with_error(),
        );
        tracker.refresh();
    }

    console.say(jobwatch_desktop::shell::USAGE);
    let shell = Shell::new(tracker, console, messages);
    shell.run(BufReader::new(tokio::io::stdin())).await
}
