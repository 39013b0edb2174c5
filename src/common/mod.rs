//! Resilience helpers shared by the services

pub mod circuit_breaker;
pub mod dedup;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitPhase};
pub use dedup::{DedupOptions, DedupRequest, RequestCache};
pub use metrics::{AlertKind, PerformanceAlert, PerformanceTracker, RequestMetrics};
