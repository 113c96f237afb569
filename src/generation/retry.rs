//! Bounded retry with exponential backoff for generation calls.

use super::{GenerationClient, GenerationClientError, GenerationRequest};
use async_trait::async_trait;
use std::time::Duration;

/// Attempt bound and initial delay for generation retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, doubling from the initial backoff.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

/// Decorator retrying transient generation failures.
///
/// Only network errors, 429 and 5xx responses are retried; the final error is returned as-is.
pub struct RetryingGenerationClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingGenerationClient<C> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C> GenerationClient for RetryingGenerationClient<C>
where
    C: GenerationClient,
{
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(answer) => return Ok(answer),
                Err(error) if error.is_transient() && attempt < self.policy.max_attempts() => {
                    let delay = self.policy.backoff_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Generation attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
