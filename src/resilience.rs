/// Retry/backoff executor for stages that call external resources.
///
/// Retries apply only to errors classified retryable (transient backend
/// failures); everything else propagates on first occurrence. Backoff is
/// exponential with a cap, and the attempt count is bounded, so a wrapped
/// call can never spin indefinitely.
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let shifted = self
            .base_delay
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(self.max_delay);
        shifted.min(self.max_delay)
    }

    /// Run `op`, retrying transient failures up to the attempt budget.
    ///
    /// The final transient error is re-wrapped with `stage` so callers see
    /// which pipeline stage exhausted its retries; the original error
    /// class is preserved.
    pub async fn execute<T, F, Fut>(&self, stage: &str, mut op: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{stage}: attempt {}/{} failed ({e}), retrying in {}ms",
                        attempt + 1,
                        self.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(EngineError::TransientBackend { message, .. }) => {
                    return Err(EngineError::TransientBackend {
                        stage: stage.to_string(),
                        message: format!("{message} (after {} attempts)", attempt + 1),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
