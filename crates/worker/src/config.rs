use std::time::Duration;

use tessera_service::config::{parse_or, ConfigError};

use crate::processor::ProcessorSettings;

/// Default target of verification links.
const DEFAULT_VERIFY_EMAIL_URL: &str = "http://localhost:8080/v1/verify_email";

/// Worker process configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub processor: ProcessorSettings,
    /// Base URL of the verification endpoint; id and secret are appended.
    pub verify_email_url: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Default                                  |
    /// |----------------------------|------------------------------------------|
    /// | `WORKER_CONCURRENCY`       | `4`                                      |
    /// | `WORKER_POLL_INTERVAL_MS`  | `500`                                    |
    /// | `WORKER_TASK_TIMEOUT_SECS` | `60`                                     |
    /// | `VERIFY_EMAIL_URL`         | `http://localhost:8080/v1/verify_email`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let concurrency: usize = parse_or("WORKER_CONCURRENCY", 4)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                value: "0".into(),
            });
        }

        Ok(Self {
            processor: ProcessorSettings {
                concurrency,
                poll_interval: Duration::from_millis(parse_or("WORKER_POLL_INTERVAL_MS", 500)?),
                task_timeout: Duration::from_secs(parse_or("WORKER_TASK_TIMEOUT_SECS", 60)?),
            },
            verify_email_url: parse_or("VERIFY_EMAIL_URL", DEFAULT_VERIFY_EMAIL_URL.to_string())?,
        })
    }
}
