use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EmissaryError, EmissaryResult};

/// Per-client execution configuration, read-only after construction.
/// Per-request overrides on the request itself take precedence over the
/// retry and redirect bounds here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Maximum redirect hops per logical request
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Per-attempt timeout in seconds (None = unbounded)
    pub attempt_timeout_secs: Option<u64>,
    /// Connection pool idle timeout for the default transmitter
    pub pool_idle_timeout_secs: Option<u64>,
    /// Connection pool max idle connections per host
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_redirects: default_max_redirects(),
            attempt_timeout_secs: None,
            pool_idle_timeout_secs: None,
            pool_max_idle_per_host: None,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_redirects() -> usize {
    5
}

impl ExecutorConfig {
    pub fn validate(&self) -> EmissaryResult<()> {
        if self.attempt_timeout_secs == Some(0) {
            return Err(EmissaryError::config("attempt timeout must be non-zero"));
        }
        if self.pool_max_idle_per_host == Some(0) {
            return Err(EmissaryError::config(
                "pool_max_idle_per_host must be non-zero",
            ));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }
}
