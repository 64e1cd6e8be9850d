use std::collections::HashMap;

use serde::Serialize;

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::retry::RetryPolicy;

/// The six logical services the system distinguishes for failure accounting.
pub const SERVICE_NAMES: &[&str] = &[
    "article-processing",
    "database-ops",
    "api-calls",
    "llm-ops",
    "background-processing",
    "search-ops",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Healthy,
    Degraded,
    Failed,
    Unknown,
}

pub struct ServiceEntry {
    pub breaker: CircuitBreaker,
    pub default_retry_policy: RetryPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealthView {
    pub name: String,
    pub health: ServiceHealth,
    pub success_rate: f64,
    pub breaker_state: CircuitState,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

/// Explicitly constructed bundle of (breaker, retry policy) per named
/// service. Not a global singleton — a process constructs exactly one of
/// these at startup and passes it by reference to every consumer.
pub struct ResilienceRegistry {
    services: HashMap<&'static str, ServiceEntry>,
}

impl ResilienceRegistry {
    pub fn new() -> Self {
        let mut services = HashMap::new();

        services.insert(
            "article-processing",
            ServiceEntry {
                breaker: CircuitBreaker::new(
                    "article-processing",
                    CircuitBreakerConfig {
                        failure_threshold: 5,
                        recovery_timeout: std::time::Duration::from_secs(120),
                        success_threshold: 3,
                        timeout: std::time::Duration::from_secs(30),
                    },
                ),
                default_retry_policy: RetryPolicy::network_ops(),
            },
        );
        services.insert(
            "database-ops",
            ServiceEntry {
                breaker: CircuitBreaker::new(
                    "database-ops",
                    CircuitBreakerConfig {
                        failure_threshold: 3,
                        recovery_timeout: std::time::Duration::from_secs(30),
                        success_threshold: 2,
                        timeout: std::time::Duration::from_secs(30),
                    },
                ),
                default_retry_policy: RetryPolicy::critical_ops(),
            },
        );
        services.insert(
            "api-calls",
            ServiceEntry {
                breaker: CircuitBreaker::new(
                    "api-calls",
                    CircuitBreakerConfig {
                        failure_threshold: 4,
                        recovery_timeout: std::time::Duration::from_secs(60),
                        success_threshold: 2,
                        timeout: std::time::Duration::from_secs(30),
                    },
                ),
                default_retry_policy: RetryPolicy::quick_ops(),
            },
        );
        services.insert(
            "llm-ops",
            ServiceEntry {
                breaker: CircuitBreaker::new(
                    "llm-ops",
                    CircuitBreakerConfig {
                        failure_threshold: 3,
                        recovery_timeout: std::time::Duration::from_secs(180),
                        success_threshold: 2,
                        timeout: std::time::Duration::from_secs(30),
                    },
                ),
                default_retry_policy: RetryPolicy::heavy_ops(),
            },
        );
        services.insert(
            "background-processing",
            ServiceEntry {
                breaker: CircuitBreaker::new(
                    "background-processing",
                    CircuitBreakerConfig {
                        failure_threshold: 7,
                        recovery_timeout: std::time::Duration::from_secs(300),
                        success_threshold: 3,
                        timeout: std::time::Duration::from_secs(30),
                    },
                ),
                default_retry_policy: RetryPolicy::heavy_ops(),
            },
        );
        services.insert(
            "search-ops",
            ServiceEntry {
                breaker: CircuitBreaker::new(
                    "search-ops",
                    CircuitBreakerConfig {
                        failure_threshold: 5,
                        recovery_timeout: std::time::Duration::from_secs(45),
                        success_threshold: 2,
                        timeout: std::time::Duration::from_secs(30),
                    },
                ),
                default_retry_policy: RetryPolicy::quick_ops(),
            },
        );

        Self { services }
    }

    pub fn breaker(&self, service: &str) -> Option<&CircuitBreaker> {
        self.services.get(service).map(|e| &e.breaker)
    }

    pub fn retry_policy(&self, service: &str) -> Option<&RetryPolicy> {
        self.services.get(service).map(|e| &e.default_retry_policy)
    }

    pub fn health_view(&self, service: &str) -> Option<ServiceHealthView> {
        let entry = self.services.get(service)?;
        let metrics = entry.breaker.metrics();
        let success_rate = entry.breaker.success_rate();
        let state = entry.breaker.state();

        let health = if state == CircuitState::Open {
            ServiceHealth::Failed
        } else if metrics.total_requests > 0 && success_rate < 50.0 {
            ServiceHealth::Degraded
        } else if metrics.total_requests == 0 {
            ServiceHealth::Unknown
        } else {
            ServiceHealth::Healthy
        };

        Some(ServiceHealthView {
            name: service.to_string(),
            health,
            success_rate,
            breaker_state: state,
            total_requests: metrics.total_requests,
            successful_requests: metrics.successful_requests,
            failed_requests: metrics.failed_requests,
        })
    }

    pub fn system_health(&self) -> Vec<ServiceHealthView> {
        SERVICE_NAMES
            .iter()
            .filter_map(|name| self.health_view(name))
            .collect()
    }
}

impl Default for ResilienceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_six_services() {
        let registry = ResilienceRegistry::new();
        for name in SERVICE_NAMES {
            assert!(registry.breaker(name).is_some());
            assert!(registry.retry_policy(name).is_some());
        }
    }

    #[test]
    fn unknown_service_has_no_entry() {
        let registry = ResilienceRegistry::new();
        assert!(registry.breaker("nonexistent").is_none());
    }

    #[test]
    fn fresh_service_reports_unknown_health() {
        let registry = ResilienceRegistry::new();
        let view = registry.health_view("api-calls").unwrap();
        assert_eq!(view.health, ServiceHealth::Unknown);
    }
}
