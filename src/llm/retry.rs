//! Retry policy shared by translation and analysis calls.

use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::RetryConfig;
use crate::llm::LlmError;

/// Terminal outcome of a model call after the retry policy gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum ModelFailure {
    #[error("request blocked due to safety concerns")]
    Blocked,
    #[error("API quota exceeded")]
    QuotaExceeded,
    #[error("API error: {0}")]
    ApiError(String),
}

impl ModelFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            ModelFailure::Blocked => "blocked",
            ModelFailure::QuotaExceeded => "quota_exceeded",
            ModelFailure::ApiError(_) => "api_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the 0-based `attempt` failed: `initial_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay.saturating_mul(factor)
    }

    /// Worst-case time spent sleeping before a terminal quota failure.
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.attempts().saturating_sub(1))
            .map(|attempt| self.delay_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Runs `op` until it succeeds or the policy gives up.
    ///
    /// Safety blocks and unexpected errors end the loop at once; quota
    /// exhaustion sleeps (suspending the task, not the thread) and retries.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ModelFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let attempts = self.attempts();
        for attempt in 0..attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(LlmError::Blocked(reason)) => {
                    error!("{} blocked by the provider: {}", label, reason);
                    return Err(ModelFailure::Blocked);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "{}: quota exceeded (attempt {}/{}): {}",
                        label,
                        attempt + 1,
                        attempts,
                        e
                    );
                    if attempt + 1 < attempts {
                        let delay = self.delay_for(attempt);
                        warn!("{}: retrying in {:?}", label, delay);
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    error!("{}: unexpected API error: {}", label, e);
                    return Err(ModelFailure::ApiError(e.to_string()));
                }
            }
        }

        error!("{}: max retries reached", label);
        Err(ModelFailure::QuotaExceeded)
    }
}
