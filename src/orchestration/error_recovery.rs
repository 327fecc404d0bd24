//! # Backoff and Retry Framework
//!
//! Generic retry-with-backoff executor used by the Job Poller (spec §4.4)
//! and by any collaborator call that can hit a transient AWS error (spec
//! §7). Classification itself is delegated to `EngineError::kind()` rather
//! than string-sniffing, since the domain's error taxonomy is closed and
//! already carries this information.
//!
//! ## Recovery Flow
//!
//! ```text
//! Error → Classify (EngineError::kind()) → Retry (if transient) → Report
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::{EngineError, ErrorKind, Result};

/// Error severity level, used only for log level selection — the retry
/// decision itself comes from `EngineError::is_retriable()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Fatal => write!(f, "FATAL"),
        }
    }
}

fn severity_for(kind: ErrorKind) -> ErrorSeverity {
    match kind {
        ErrorKind::Transient => ErrorSeverity::Warning,
        ErrorKind::Fatal => ErrorSeverity::Fatal,
        _ => ErrorSeverity::Error,
    }
}

/// An error tagged with the classification the retry executor acted on.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub error: EngineError,
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub retriable: bool,
}

impl ClassifiedError {
    pub fn classify(error: EngineError) -> Self {
        let kind = error.kind();
        Self {
            retriable: error.is_retriable(),
            severity: severity_for(kind),
            kind,
            error,
        }
    }
}

/// Backoff configuration (spec §4.4): geometric backoff with jitter, capped.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts before the error is surfaced.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Jitter fraction applied as `delay *= 1.0 + U(0, jitter)`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            multiplier: 1.5,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Delay before the given (0-indexed) attempt, per spec §4.4's backoff
    /// formula: `min(base * factor^attempt, cap) * (1 + U(0, jitter))`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let mut delay =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        delay = delay.min(self.max_delay.as_millis() as f64);

        if self.jitter > 0.0 {
            use rand::Rng;
            let mut rng = rand::rng();
            let jitter = rng.random_range(0.0..=self.jitter);
            delay *= 1.0 + jitter;
        }

        Duration::from_millis(delay as u64)
    }
}

/// Executes an async operation, retrying transient `EngineError`s with
/// backoff until `max_attempts` is exhausted or a non-transient error is hit.
pub struct RetryExecutor {
    config: RetryConfig,
    total_retries: Arc<AtomicU64>,
    successful_retries: Arc<AtomicU64>,
    failed_retries: Arc<AtomicU64>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_retries: Arc::new(AtomicU64::new(0)),
            successful_retries: Arc::new(AtomicU64::new(0)),
            failed_retries: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        self.successful_retries.fetch_add(1, Ordering::Relaxed);
                        info!("operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let classified = ClassifiedError::classify(e);

                    if !classified.retriable || attempt >= self.config.max_attempts {
                        if attempt > 0 {
                            self.failed_retries.fetch_add(1, Ordering::Relaxed);
                        }
                        error!(
                            "operation failed after {} attempts: {}",
                            attempt + 1,
                            classified.error
                        );
                        return Err(classified.error);
                    }

                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    let delay = self.config.delay_for_attempt(attempt);

                    warn!(
                        "attempt {} failed ({:?}), retrying in {:?}",
                        attempt + 1,
                        classified.kind,
                        delay
                    );

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub fn statistics(&self) -> RetryStats {
        RetryStats {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            successful_retries: self.successful_retries.load(Ordering::Relaxed),
            failed_retries: self.failed_retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn classifies_transient_errors_as_retriable() {
        let classified = ClassifiedError::classify(EngineError::Throttling("DescribeJobs".into()));
        assert_eq!(classified.kind, ErrorKind::Transient);
        assert!(classified.retriable);
    }

    #[test]
    fn classifies_conflict_errors_as_non_retriable() {
        let classified =
            ClassifiedError::classify(EngineError::ExecutionNotFound("e-1".into()));
        assert_eq!(classified.kind, ErrorKind::Conflict);
        assert!(!classified.retriable);
    }

    #[test]
    fn retry_config_delay_matches_spec_formula() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            multiplier: 1.5,
            jitter: 0.0,
            max_attempts: 5,
        };

        assert_eq!(config.delay_for_attempt(0).as_secs(), 10);
        assert_eq!(config.delay_for_attempt(1).as_secs(), 15);
        assert_eq!(config.delay_for_attempt(2).as_secs(), 22);
    }

    #[tokio::test]
    async fn retry_executor_retries_transient_then_succeeds() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
        };

        let executor = RetryExecutor::new(config);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = executor
            .execute(|| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(EngineError::Throttling("DescribeJobs".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_executor_gives_up_on_non_retriable_error() {
        let executor = RetryExecutor::new(RetryConfig::default());

        let result = executor
            .execute(|| async { Err::<(), _>(EngineError::ExecutionNotFound("e-1".into())) })
            .await;

        assert!(result.is_err());
    }
}
