//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::jobs::{CHECK_EVERY, PollPolicy};

/// Paths of the job endpoints, relative to the API URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub request_job: String,
    pub job_result: String,
    pub remove_failed_job: String,
    pub download: String,
    pub tasks: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            request_job: "/request_job".to_string(),
            job_result: "/job_result".to_string(),
            remove_failed_job: "/remove_failed_job".to_string(),
            download: "/download".to_string(),
            tasks: "/tasks".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Tracker client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub auth_token: Option<String>,
    pub endpoints: Endpoints,
    pub poll: PollPolicy,
    /// Where downloaded results go (None = platform download directory).
    pub download_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            auth_token: None,
            endpoints: Endpoints::default(),
            poll: PollPolicy::default(),
            download_dir: None,
        }
    }
}

impl ClientConfig {
    pub const API_URL: &'static str = "JOBWATCH_API_URL";
    pub const AUTH_TOKEN: &'static str = "JOBWATCH_AUTH_TOKEN";
    pub const CHECK_EVERY_MS: &'static str = "JOBWATCH_CHECK_EVERY_MS";
    pub const MAX_POLLS: &'static str = "JOBWATCH_MAX_POLLS";
    pub const DOWNLOAD_DIR: &'static str = "JOBWATCH_DOWNLOAD_DIR";

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(Self::API_URL).filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }
        config.auth_token = lookup(Self::AUTH_TOKEN).filter(|v| !v.is_empty());

        let check_every = match lookup(Self::CHECK_EVERY_MS) {
            Some(raw) => Duration::from_millis(parse_number(Self::CHECK_EVERY_MS, &raw)?),
            None => CHECK_EVERY,
        };
        if check_every.is_zero() {
            return Err(ConfigError::Invalid {
                key: Self::CHECK_EVERY_MS,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        config.poll = PollPolicy::fixed(check_every);

        if let Some(raw) = lookup(Self::MAX_POLLS) {
            let max = parse_number(Self::MAX_POLLS, &raw)?;
            let max = u32::try_from(max).map_err(|e| ConfigError::Invalid {
                key: Self::MAX_POLLS,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config.poll = config.poll.with_max_polls(max);
        }

        config.download_dir = lookup(Self::DOWNLOAD_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
