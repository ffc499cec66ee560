//! Retry decisioning: predicate plus backoff function.

use std::sync::Arc;
use std::time::Duration;

use crate::error::EmissaryError;
use crate::message::{Request, Response};

/// Decides whether an attempt's outcome warrants another attempt and how
/// long to wait before it. The executor owns the budget; the policy only
/// classifies outcomes and paces retries.
pub trait RetryPolicy: Send + Sync {
    /// `cause` carries a transport-level failure, `response` a completed
    /// response the caller may still want to retry (e.g. specific status
    /// codes); exactly one of them is present per consultation.
    fn can_retry(
        &self,
        request: &Request,
        response: Option<&Response>,
        state: &RetryState,
        cause: Option<&EmissaryError>,
    ) -> bool;

    /// Delay before the given (1-based) attempt's retry; `None` retries
    /// immediately
    fn interval(&self, attempt: u32) -> Option<Duration>;
}

/// Ephemeral state scoped to one dispatch's retry loop
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Elapsed time since the first attempt started
    pub elapsed: Duration,
    /// Failure cause of the previous attempt, if any
    pub last_error: Option<EmissaryError>,
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 1,
            elapsed: Duration::ZERO,
            last_error: None,
        }
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear backoff: delay = base_delay * attempt
    Linear,
    /// Exponential backoff: delay = base_delay * multiplier^(attempt-1)
    Exponential { multiplier: f64 },
}

/// Delay schedule consulted when a policy is configured with backoff
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
    /// Jitter the delay to avoid synchronized retries
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Delay before retrying the given (1-based) attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_millis = self.base_delay.as_millis() as f64;

        let delay_millis = match self.strategy {
            BackoffStrategy::Fixed => base_millis,
            BackoffStrategy::Linear => base_millis * attempt as f64,
            BackoffStrategy::Exponential { multiplier } => {
                base_millis * multiplier.powi(attempt.saturating_sub(1) as i32)
            }
        };

        let mut delay = Duration::from_millis(
            delay_millis.min(self.max_delay.as_millis() as f64) as u64,
        );

        if self.jitter {
            use rand::Rng;
            let factor = rand::thread_rng().gen_range(0.8..1.2);
            delay = Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
                .min(self.max_delay);
        }

        delay
    }
}

type ResponsePredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// Default policy: retry transport-level failures; never retry on an
/// arbitrary response unless a predicate is supplied; retry immediately
/// unless backoff is configured.
#[derive(Default)]
pub struct DefaultRetryPolicy {
    response_predicate: Option<ResponsePredicate>,
    backoff: Option<BackoffConfig>,
}

impl DefaultRetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag responses as retryable with a custom predicate
    pub fn with_response_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.response_predicate = Some(Arc::new(predicate));
        self
    }

    /// Flag specific status codes as retryable
    pub fn retry_on_status(statuses: Vec<u16>) -> Self {
        Self::new().with_response_predicate(move |response| {
            statuses.contains(&response.status().as_u16())
        })
    }

    /// Pace retries with the given backoff schedule
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn can_retry(
        &self,
        _request: &Request,
        response: Option<&Response>,
        _state: &RetryState,
        cause: Option<&EmissaryError>,
    ) -> bool {
        if let Some(cause) = cause {
            return cause.is_retryable();
        }
        match (&self.response_predicate, response) {
            (Some(predicate), Some(response)) => predicate(response),
            _ => false,
        }
    }

    fn interval(&self, attempt: u32) -> Option<Duration> {
        self.backoff.as_ref().map(|backoff| backoff.delay_for(attempt))
    }
}
