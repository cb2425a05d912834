use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Transient-Failure Retry
// ============================================================================
//
// Exponential-backoff retry used for the optimistic-concurrency loop: a
// version conflict on the aggregate store is transient (another writer won
// the version; reload and re-validate), while every business error is
// permanent and returned immediately.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

/// Classifies an error as retryable or permanent.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Run `operation`, retrying transient failures with exponential backoff.
/// Permanent failures and exhausted retries return the last error.
pub async fn retry_on_transient<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) if !error.is_transient() => return Err(error),
            Err(error) => {
                if attempt >= config.max_attempts {
                    tracing::error!(
                        attempt,
                        error = %error,
                        "Transient failure persisted through all retries"
                    );
                    return Err(error);
                }

                tracing::debug!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis(),
                    "Transient failure, retrying after delay"
                );

                sleep(delay).await;

                delay = Duration::from_millis(
                    ((delay.as_millis() as f64) * config.multiplier) as u64,
                )
                .min(config.max_delay);
            }
        }
    }
}
