use redlabel_core::{CoreError, ErrorExt, RunConfig};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Fixed pause before every retry
    pub cooldown: Duration,
    /// Wait for a server-provided `retry-after` when it exceeds the cool-down
    pub honor_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            cooldown: Duration::from_secs(120),
            honor_retry_after: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_run_config(run: &RunConfig) -> Self {
        Self {
            max_attempts: run.max_attempts.max(1),
            cooldown: run.retry_cooldown(),
            honor_retry_after: true,
        }
    }

    /// Pause before the next attempt after `error`.
    pub fn delay_for(&self, error: &CoreError) -> Duration {
        match get_retry_strategy(error) {
            RetryStrategy::RetryWithDelay(hint) if self.honor_retry_after => {
                self.cooldown.max(hint)
            }
            _ => self.cooldown,
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry after the policy's cool-down
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Retry metrics for the end-of-run summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryMetrics {
    pub total_attempts: u64,
    pub total_retries: u64,
    pub recovered_operations: u64,
    pub exhausted_operations: u64,
}

/// Result of an operation run under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, CoreError>,
    pub attempts: u32,
}

/// Retry executor that wraps operations with retry logic
#[derive(Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    metrics: Mutex<RetryMetrics>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            metrics: Mutex::new(RetryMetrics::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn metrics_mut(&self) -> MutexGuard<'_, RetryMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        self.run(operation_name, operation).await.result
    }

    /// Execute an operation with retry logic, reporting how many attempts it took.
    ///
    /// Each attempt starts from scratch; whatever a failed attempt produced is
    /// discarded with its error.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.metrics_mut().total_attempts += 1;
            if attempt > 1 {
                debug!("Retry attempt {} for {}", attempt - 1, operation_name);
            }

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        self.metrics_mut().recovered_operations += 1;
                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name,
                            attempt - 1
                        );
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    let strategy = get_retry_strategy(&err);
                    if strategy == RetryStrategy::NoRetry || attempt >= max_attempts {
                        self.metrics_mut().exhausted_operations += 1;
                        if strategy == RetryStrategy::NoRetry {
                            error!("Not retrying {} due to error type: {}", operation_name, err);
                        } else {
                            error!(
                                "Operation {} failed after {} attempts: {}",
                                operation_name, attempt, err
                            );
                        }
                        return Attempted {
                            result: Err(err),
                            attempts: attempt,
                        };
                    }

                    let delay = self.policy.delay_for(&err);
                    warn!(
                        "Error in {} (attempt {}/{}): {}. Retrying in {:?}",
                        operation_name, attempt, max_attempts, err, delay
                    );
                    self.metrics_mut().total_retries += 1;
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        self.metrics_mut().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redlabel_core::{ConfigError, ExportError, RedditApiError};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            cooldown: Duration::ZERO,
            honor_retry_after: false,
        }
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.cooldown, Duration::from_secs(120));
    }

    #[test]
    fn test_policy_from_run_config() {
        let run = RunConfig {
            pause_between_forums_secs: 0,
            retry_cooldown_secs: 30,
            max_attempts: 3,
        };
        let policy = RetryPolicy::from_run_config(&run);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.cooldown, Duration::from_secs(30));
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        let rate_limit_error =
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
        assert_eq!(
            get_retry_strategy(&rate_limit_error),
            RetryStrategy::RetryWithDelay(Duration::from_secs(60))
        );

        let auth_error = CoreError::RedditApi(RedditApiError::AuthenticationFailed {
            reason: "Invalid credentials".to_string(),
        });
        assert_eq!(get_retry_strategy(&auth_error), RetryStrategy::NoRetry);

        let config_error = CoreError::Config(ConfigError::MissingField {
            field: "client_id".to_string(),
        });
        assert_eq!(get_retry_strategy(&config_error), RetryStrategy::NoRetry);

        let server_error = CoreError::RedditApi(RedditApiError::ServerError { status_code: 500 });
        assert_eq!(get_retry_strategy(&server_error), RetryStrategy::Retry);
    }

    #[test]
    fn test_strategy_agrees_with_is_retryable() {
        let errors = vec![
            CoreError::RedditApi(RedditApiError::InvalidToken),
            CoreError::RedditApi(RedditApiError::RequestTimeout),
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 5 }),
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: "bad".to_string(),
            }),
            CoreError::Export(ExportError::EmptySchema),
            CoreError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe")),
        ];
        for err in &errors {
            assert_eq!(
                get_retry_strategy(err) != RetryStrategy::NoRetry,
                err.is_retryable(),
                "{err}"
            );
        }
    }

    #[test]
    fn test_delay_honors_longer_retry_after() {
        let policy = RetryPolicy {
            max_attempts: 2,
            cooldown: Duration::from_secs(10),
            honor_retry_after: true,
        };
        let long = CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 90 });
        let short = CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 1 });
        assert_eq!(policy.delay_for(&long), Duration::from_secs(90));
        assert_eq!(policy.delay_for(&short), Duration::from_secs(10));
        assert_eq!(
            policy.delay_for(&CoreError::RedditApi(RedditApiError::RequestTimeout)),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_retry_executor_success_on_first_attempt() {
        let executor = RetryExecutor::new(fast_policy(2));

        let outcome = executor
            .run("test_operation", || async { Ok::<i32, CoreError>(42) })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap(), 42);

        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 0);
        assert_eq!(metrics.recovered_operations, 0);
    }

    #[tokio::test]
    async fn test_retry_executor_recovers_on_second_attempt() {
        let executor = RetryExecutor::new(fast_policy(2));
        let attempt_count = Arc::new(Mutex::new(0));
        let counter = attempt_count.clone();

        let outcome = executor
            .run("test_operation", move || {
                let counter = counter.clone();
                async move {
                    let mut count = counter.lock().unwrap();
                    *count += 1;
                    if *count == 1 {
                        Err(CoreError::RedditApi(RedditApiError::ServerError {
                            status_code: 503,
                        }))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.unwrap(), 7);
        assert_eq!(*attempt_count.lock().unwrap(), 2);

        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 1);
        assert_eq!(metrics.recovered_operations, 1);
    }

    #[tokio::test]
    async fn test_retry_executor_gives_up_after_max_attempts() {
        let executor = RetryExecutor::new(fast_policy(2));
        let attempt_count = Arc::new(Mutex::new(0));
        let counter = attempt_count.clone();

        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<i32, CoreError>(CoreError::RedditApi(RedditApiError::RequestTimeout))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::RequestTimeout))
        ));
        assert_eq!(*attempt_count.lock().unwrap(), 2);
        assert_eq!(executor.get_metrics().exhausted_operations, 1);
    }

    #[tokio::test]
    async fn test_retry_executor_no_retry_on_auth_error() {
        let executor = RetryExecutor::new(fast_policy(3));
        let attempt_count = Arc::new(Mutex::new(0));
        let counter = attempt_count.clone();

        let outcome = executor
            .run("test_operation", move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<i32, CoreError>(CoreError::RedditApi(
                        RedditApiError::AuthenticationFailed {
                            reason: "Invalid credentials".to_string(),
                        },
                    ))
                }
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(*attempt_count.lock().unwrap(), 1);
        assert_eq!(executor.get_metrics().total_retries, 0);
    }
}
