//! Capped exponential backoff for external API calls.

use std::future::Future;

use rand::Rng;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

/// Maximum random jitter added to each backoff delay (ms).
const JITTER_MS: u64 = 500;

/// Run `f`, retrying transient failures with doubling, jittered, capped
/// delays. Definitive errors (4xx other than 429, configuration errors)
/// propagate immediately without retry.
pub async fn with_retry<T, F, Fut>(options: RetryOptions, mut f: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut last_error = None;

    for attempt in 0..=options.max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }

                if attempt < options.max_retries {
                    let delay_ms = backoff_delay_ms(options, attempt);
                    tracing::warn!(
                        "Retry attempt {}/{} after {}ms: {}",
                        attempt + 1,
                        options.max_retries,
                        delay_ms,
                        err,
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| AppError::InternalError("All retry attempts failed".to_string())))
}

fn backoff_delay_ms(options: RetryOptions, attempt: u32) -> u64 {
    let jitter = rand::thread_rng().gen_range(0..JITTER_MS);
    (options.base_delay_ms.saturating_mul(1 << attempt) + jitter).min(options.max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_options() -> RetryOptions {
        RetryOptions {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast_options(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, AppError>(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast_options(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::ExternalServiceError("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(fast_options(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AppError::UpstreamStatus {
                    provider: "openweather",
                    status: 401,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_retries_on_persistent_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(fast_options(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AppError::UpstreamStatus {
                    provider: "noaa",
                    status: 503,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4, "initial try + 3 retries");
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let options = RetryOptions {
            max_retries: 10,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        };
        for attempt in 0..10 {
            assert!(backoff_delay_ms(options, attempt) <= 10_000);
        }
    }
}
