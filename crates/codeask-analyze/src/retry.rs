//! Retrying execution of a single AI job.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use codeask_core::{AnalyzerConfig, BoxFuture, ProviderError};

/// Exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per job, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub base_delay: Duration,
    /// Ceiling for a single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AnalyzerConfig::default())
    }
}

/// Lifecycle of one job inside the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not started yet.
    Pending,
    /// Running the attempt with this zero-based index.
    Attempting(u32),
    /// An attempt produced a usable response.
    Succeeded,
    /// The job ended without a response; the outcome carries the last error.
    Failed,
}

impl RetryPolicy {
    /// Take the retry settings from an analyzer config.
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
        }
    }

    /// Whether a job that failed attempt `attempt_index` with `error` gets another try.
    pub fn should_retry(&self, error: &ProviderError, attempt_index: u32) -> bool {
        error.is_retryable() && attempt_index.saturating_add(1) < self.max_attempts
    }

    /// Wait before the attempt following `attempt_index`: `base * 2^index`, capped.
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// State a job moves to after attempt `attempt_index` failed with `error`.
    pub fn after_failure(&self, error: &ProviderError, attempt_index: u32) -> JobState {
        if self.should_retry(error, attempt_index) {
            JobState::Attempting(attempt_index + 1)
        } else {
            JobState::Failed
        }
    }
}

/// Abstraction over waiting between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Final result of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Cleaned response text or the last error seen.
    pub result: Result<String, ProviderError>,
    /// Attempts consumed.
    pub attempts: u32,
}

impl JobOutcome {
    /// Terminal state of the job.
    pub fn state(&self) -> JobState {
        if self.result.is_ok() {
            JobState::Succeeded
        } else {
            JobState::Failed
        }
    }
}

/// Runs a job until it succeeds, fails permanently or runs out of attempts.
///
/// Every attempt is bounded by the request timeout. Cancellation interrupts
/// both in-flight attempts and backoff waits and is never retried.
#[derive(Clone)]
pub struct RetryingJobRunner {
    policy: RetryPolicy,
    request_timeout: Duration,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl RetryingJobRunner {
    /// Create a runner with the tokio sleeper and no cancellation.
    pub fn new(policy: RetryPolicy, request_timeout: Duration) -> Self {
        Self {
            policy,
            request_timeout,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a runner from an analyzer config.
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(RetryPolicy::from_config(config), config.request_timeout)
    }

    /// Replace the sleeper used for backoff waits.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Observe `cancel` for cancellation.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `job` to completion.
    ///
    /// `job` receives the zero-based attempt index. `on_retry` is called
    /// with the one-based number of the attempt about to start and the
    /// error that caused the retry.
    pub async fn execute<F, Fut, R>(&self, mut job: F, mut on_retry: R) -> JobOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
        R: FnMut(u32, &ProviderError),
    {
        let mut attempt = 0;

        loop {
            let error = match self.attempt(job(attempt)).await {
                Ok(text) => {
                    return JobOutcome {
                        result: Ok(text),
                        attempts: attempt + 1,
                    };
                }
                Err(error) => error,
            };

            let JobState::Attempting(next) = self.policy.after_failure(&error, attempt) else {
                debug!(attempts = attempt + 1, error = %error, "job failed");
                return JobOutcome {
                    result: Err(error),
                    attempts: attempt + 1,
                };
            };

            let delay = self.policy.backoff_delay(attempt);
            warn!(attempt = next + 1, delay_ms = delay.as_millis() as u64, error = %error, "retrying");
            on_retry(next + 1, &error);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return JobOutcome {
                        result: Err(ProviderError::Cancelled),
                        attempts: attempt + 1,
                    };
                }
                _ = self.sleeper.sleep(delay) => {}
            }
            attempt = next;
        }
    }

    /// One attempt under the timeout and the cancellation token.
    async fn attempt<Fut>(&self, call: Fut) -> Result<String, ProviderError>
    where
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            result = tokio::time::timeout(self.request_timeout, call) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::Timeout {
                    timeout_ms: self.request_timeout.as_millis() as u64,
                }),
            },
        }
    }
}

impl std::fmt::Debug for RetryingJobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingJobRunner")
            .field("policy", &self.policy)
            .field("request_timeout", &self.request_timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
