pub mod breaker;
pub mod persist;
pub mod registry;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use registry::{ResilienceRegistry, ServiceHealth, ServiceHealthView, SERVICE_NAMES};
pub use retry::{BackoffStrategy, RecoveryAttemptRecord, RetryManager, RetryPolicy};
