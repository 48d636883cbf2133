use engine_config::settings::batch::BatchConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    /// Retry, but wait at least this long before the next attempt.
    RetryAfter(Duration),
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal { error: E, attempts: u32 },
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded { error: E, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::AttemptsExceeded { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::AttemptsExceeded { error, .. } => error,
        }
    }
}

/// A successful value together with the number of tries it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// `retry_attempts` counts retries, so the first try comes on top.
    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.retry_attempts().saturating_add(1),
            config.retry_delay_base(),
            config.retry_delay_max(),
        )
    }

    /// Executes the operation with the configured retry policy.
    ///
    /// `on_retry` is called with the failed attempt number before each backoff sleep.
    pub async fn run<F, Fut, T, E, Classifier, OnRetry>(
        &self,
        mut op: F,
        classify: Classifier,
        mut on_retry: OnRetry,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
        OnRetry: FnMut(u32, &E),
    {
        let mut attempt = 0u32;

        loop {
            let attempts = attempt + 1;
            match op(attempt).await {
                Ok(value) => return Ok(Attempted { value, attempts }),
                Err(error) => {
                    let floor = match classify(&error) {
                        RetryDisposition::Stop => {
                            return Err(RetryError::Fatal { error, attempts });
                        }
                        RetryDisposition::Retry => Duration::ZERO,
                        RetryDisposition::RetryAfter(wait) => wait.min(self.max_delay),
                    };

                    if attempts >= self.max_attempts {
                        return Err(RetryError::AttemptsExceeded { error, attempts });
                    }

                    on_retry(attempts, &error);
                    sleep(self.backoff_delay(attempt).max(floor)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// `base × 2^attempt`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let factor = 1u128 << attempt.min(16);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
