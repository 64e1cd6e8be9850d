use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ingest_core::{ErrorKind, IngestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
    Fibonacci,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    pub jitter: bool,
    pub backoff_multiplier: f64,
    pub retryable: fn(ErrorKind) -> bool,
}

impl RetryPolicy {
    fn default_retryable(kind: ErrorKind) -> bool {
        kind.is_retryable_by_default()
    }

    /// quick-ops: 3 attempts, 0.5s base, 10s max, exponential.
    pub fn quick_ops() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            backoff_multiplier: 2.0,
            retryable: Self::default_retryable,
        }
    }

    /// network-ops: 5 attempts, 2s base, 60s max, exponential.
    pub fn network_ops() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            backoff_multiplier: 2.0,
            retryable: Self::default_retryable,
        }
    }

    /// heavy-ops: 3 attempts, 5s base, 300s max, linear.
    pub fn heavy_ops() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            strategy: BackoffStrategy::Linear,
            jitter: true,
            backoff_multiplier: 2.0,
            retryable: Self::default_retryable,
        }
    }

    /// critical-ops: 7 attempts, 1s base, 120s max, fibonacci.
    pub fn critical_ops() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            strategy: BackoffStrategy::Fibonacci,
            jitter: true,
            backoff_multiplier: 2.0,
            retryable: Self::default_retryable,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let nominal = match self.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base * attempt as f64,
            BackoffStrategy::Fibonacci => base * fibonacci(attempt) as f64,
            BackoffStrategy::Exponential => base * self.backoff_multiplier.powi(attempt as i32 - 1),
        };

        let jittered = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.9..=1.1);
            nominal * factor
        } else {
            nominal
        };

        Duration::from_secs_f64(jittered.max(0.0).min(self.max_delay.as_secs_f64()))
    }
}

fn fibonacci(n: u32) -> u64 {
    if n <= 1 {
        return n as u64;
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 2..=n {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttemptRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub attempt_number: u32,
    pub error_kind: String,
    pub error_message: String,
    pub delay_before_retry_secs: f64,
    pub success: bool,
}

const MAX_HISTORY: usize = 100;

/// Runs a callable under a [`RetryPolicy`], recording a bounded history of
/// attempts. A circuit-open error is never retried and propagates
/// immediately; a non-retryable error also propagates without consuming the
/// remaining attempt budget.
pub struct RetryManager {
    name: String,
    history: Mutex<VecDeque<RecoveryAttemptRecord>>,
}

impl RetryManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn execute<F, Fut, T>(&self, policy: &RetryPolicy, mut f: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, IngestError>>,
    {
        let mut last_err: Option<IngestError> = None;

        for attempt in 1..=policy.max_attempts {
            match f().await {
                Ok(value) => {
                    if last_err.is_some() {
                        self.record(attempt, &last_err.unwrap(), Duration::ZERO, true);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if err.kind() == ErrorKind::CircuitOpen {
                        warn!(retry_manager = %self.name, "circuit open, aborting recovery");
                        return Err(err);
                    }

                    if attempt >= policy.max_attempts {
                        self.record(attempt, &err, Duration::ZERO, false);
                        return Err(err);
                    }

                    if !(policy.retryable)(err.kind()) {
                        self.record(attempt, &err, Duration::ZERO, false);
                        return Err(err);
                    }

                    let delay = policy.delay_for_attempt(attempt);
                    self.record(attempt, &err, delay, false);
                    info!(retry_manager = %self.name, attempt, delay_ms = delay.as_millis() as u64, "retrying after failure");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| IngestError::Other(anyhow::anyhow!("retry loop exhausted"))))
    }

    fn record(&self, attempt_number: u32, err: &IngestError, delay: Duration, success: bool) {
        let record = RecoveryAttemptRecord {
            timestamp: chrono::Utc::now(),
            attempt_number,
            error_kind: format!("{:?}", err.kind()),
            error_message: err.to_string(),
            delay_before_retry_secs: delay.as_secs_f64(),
            success,
        };
        let mut history = self.history.lock().unwrap();
        if history.len() >= MAX_HISTORY {
            history.pop_front();
        }
        history.push_back(record);
    }

    pub fn history(&self) -> Vec<RecoveryAttemptRecord> {
        self.history.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn fibonacci_matches_known_sequence() {
        assert_eq!(fibonacci(0), 0);
        assert_eq!(fibonacci(1), 1);
        assert_eq!(fibonacci(5), 5);
        assert_eq!(fibonacci(7), 13);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let manager = RetryManager::new("t");
        let policy = RetryPolicy {
            jitter: false,
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::quick_ops()
        };
        let attempts = AtomicU32::new(0);

        let result = manager
            .execute(&policy, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(IngestError::Network("transient".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn circuit_open_never_retried() {
        let manager = RetryManager::new("t2");
        let policy = RetryPolicy::quick_ops();
        let attempts = AtomicU32::new(0);

        let result: Result<(), IngestError> = manager
            .execute(&policy, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(IngestError::CircuitOpen("open".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let manager = RetryManager::new("t3");
        let policy = RetryPolicy::quick_ops();
        let attempts = AtomicU32::new(0);

        let result: Result<(), IngestError> = manager
            .execute(&policy, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(IngestError::AuthFailure("bad creds".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
