use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ingest_core::{ErrorKind, IngestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

/// Serializable snapshot written to `circuit_breaker_{name}.json`, matching
/// the state-file shape every breaker persists on each transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub state_change_time: chrono::DateTime<chrono::Utc>,
    pub metrics: SnapshotMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_time: Option<chrono::DateTime<chrono::Utc>>,
}

struct Inner {
    state: CircuitState,
    metrics: CircuitMetrics,
    last_failure_instant: Option<Instant>,
    state_change_instant: Instant,
    last_failure_time: Option<chrono::DateTime<chrono::Utc>>,
    state_change_time: chrono::DateTime<chrono::Utc>,
}

/// Per-named-service failure accounting. Threshold transitions are the ONLY
/// way the state changes. While open, every call fails fast with
/// `IngestError::CircuitOpen` until `now - last_failure >= recovery_timeout`.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let now_instant = Instant::now();
        let now_time = chrono::Utc::now();
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                metrics: CircuitMetrics::default(),
                last_failure_instant: None,
                state_change_instant: now_instant,
                last_failure_time: None,
                state_change_time: now_time,
            }),
        }
    }

    /// Restore a breaker from a persisted snapshot (loaded on startup).
    pub fn from_snapshot(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        snapshot: CircuitBreakerSnapshot,
    ) -> Self {
        let breaker = Self::new(name, config);
        {
            let mut inner = breaker.inner.lock().unwrap();
            inner.state = snapshot.state;
            inner.metrics = CircuitMetrics {
                total_requests: snapshot.metrics.total_requests,
                successful_requests: snapshot.metrics.successful_requests,
                failed_requests: snapshot.metrics.failed_requests,
                consecutive_failures: snapshot.metrics.consecutive_failures,
                consecutive_successes: snapshot.metrics.consecutive_successes,
            };
            inner.last_failure_time = snapshot.metrics.last_failure_time;
            inner.state_change_time = snapshot.state_change_time;
        }
        breaker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    fn can_attempt(&self, inner: &mut Inner) -> bool {
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(last_failure) = inner.last_failure_instant {
                    if last_failure.elapsed() >= self.config.recovery_timeout {
                        self.transition_to_half_open(inner);
                        return true;
                    }
                }
                false
            }
            CircuitState::HalfOpen => true,
        }
    }

    fn transition_to_half_open(&self, inner: &mut Inner) {
        info!(breaker = %self.name, "circuit transitioning to half-open");
        inner.state = CircuitState::HalfOpen;
        inner.state_change_instant = Instant::now();
        inner.state_change_time = chrono::Utc::now();
        inner.metrics.consecutive_successes = 0;
    }

    fn transition_to_open(&self, inner: &mut Inner) {
        warn!(breaker = %self.name, "circuit open: too many failures");
        inner.state = CircuitState::Open;
        inner.state_change_instant = Instant::now();
        inner.state_change_time = chrono::Utc::now();
        let now = Instant::now();
        inner.last_failure_instant = Some(now);
        inner.last_failure_time = Some(chrono::Utc::now());
    }

    fn transition_to_closed(&self, inner: &mut Inner) {
        info!(breaker = %self.name, "circuit closed: service recovered");
        inner.state = CircuitState::Closed;
        inner.state_change_instant = Instant::now();
        inner.state_change_time = chrono::Utc::now();
        inner.metrics.consecutive_failures = 0;
    }

    fn record_success(&self, inner: &mut Inner) {
        inner.metrics.total_requests += 1;
        inner.metrics.successful_requests += 1;
        inner.metrics.consecutive_failures = 0;
        inner.metrics.consecutive_successes += 1;

        if inner.state == CircuitState::HalfOpen
            && inner.metrics.consecutive_successes >= self.config.success_threshold
        {
            self.transition_to_closed(inner);
        }
    }

    fn record_failure(&self, inner: &mut Inner) {
        inner.metrics.total_requests += 1;
        inner.metrics.failed_requests += 1;
        inner.metrics.consecutive_failures += 1;
        inner.metrics.consecutive_successes = 0;
        let now = Instant::now();
        inner.last_failure_instant = Some(now);
        inner.last_failure_time = Some(chrono::Utc::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.metrics.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open(inner);
                }
            }
            CircuitState::HalfOpen => self.transition_to_open(inner),
            CircuitState::Open => {}
        }
    }

    /// Run `fn` under breaker protection. `fn` must itself never panic;
    /// it returns a `Result` whose `Err` is recorded as a failure.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, IngestError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, IngestError>>,
    {
        {
            let mut inner = self.inner.lock().unwrap();
            if !self.can_attempt(&mut inner) {
                return Err(IngestError::CircuitOpen(format!(
                    "circuit breaker {} is open",
                    self.name
                )));
            }
        }

        let start = Instant::now();
        let result = f().await;
        let elapsed = start.elapsed();

        let timed_out = elapsed > self.config.timeout;
        let mut inner = self.inner.lock().unwrap();
        match result {
            Ok(value) if !timed_out => {
                self.record_success(&mut inner);
                Ok(value)
            }
            Ok(_) => {
                self.record_failure(&mut inner);
                Err(IngestError::Timeout(self.config.timeout.as_secs()))
            }
            Err(err) => {
                self.record_failure(&mut inner);
                Err(err)
            }
        }
    }

    pub fn metrics(&self) -> CircuitMetrics {
        self.inner.lock().unwrap().metrics.clone()
    }

    pub fn success_rate(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        if inner.metrics.total_requests == 0 {
            return 100.0;
        }
        (inner.metrics.successful_requests as f64 / inner.metrics.total_requests as f64) * 100.0
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        CircuitBreakerSnapshot {
            state: inner.state,
            state_change_time: inner.state_change_time,
            metrics: SnapshotMetrics {
                total_requests: inner.metrics.total_requests,
                successful_requests: inner.metrics.successful_requests,
                failed_requests: inner.metrics.failed_requests,
                consecutive_failures: inner.metrics.consecutive_failures,
                consecutive_successes: inner.metrics.consecutive_successes,
                last_failure_time: inner.last_failure_time,
            },
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.metrics = CircuitMetrics::default();
        inner.last_failure_instant = None;
        inner.last_failure_time = None;
        inner.state_change_instant = Instant::now();
        inner.state_change_time = chrono::Utc::now();
    }

    pub fn force_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.transition_to_open(&mut inner);
    }
}

/// Classify an [`IngestError`] the way the retry manager does, exposed here
/// so callers checking "is this a circuit-open error" inspect the enum, not
/// the message.
pub fn is_circuit_open(err: &IngestError) -> bool {
    err.kind() == ErrorKind::CircuitOpen
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn failing() -> Result<(), IngestError> {
        Err(IngestError::Network("boom".into()))
    }

    async fn succeeding() -> Result<(), IngestError> {
        Ok(())
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_millis(50),
                success_threshold: 2,
                timeout: Duration::from_secs(5),
            },
        );

        for _ in 0..3 {
            let _ = breaker.call(|| failing()).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker.call(|| succeeding()).await;
        assert!(matches!(result, Err(IngestError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn recovers_through_half_open() {
        let breaker = CircuitBreaker::new(
            "test2",
            CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_millis(20),
                success_threshold: 2,
                timeout: Duration::from_secs(5),
            },
        );

        let _ = breaker.call(|| failing()).await;
        let _ = breaker.call(|| failing()).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let _ = breaker.call(|| succeeding()).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _ = breaker.call(|| succeeding()).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
