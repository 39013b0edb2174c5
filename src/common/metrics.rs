//! Per-request-name timing and error counters.
//!
//! Every tracked call updates the entry for its name and is checked against
//! three alert rules: request frequency, average response time and error
//! rate. Alerts are logged and returned to the caller.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Two requests closer together than this count as high frequency
pub const HIGH_FREQUENCY_WINDOW: Duration = Duration::from_millis(100);
/// Average response time above which responses are slow
pub const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_secs(2);
/// Error share above which the error rate is high
pub const ERROR_RATE_THRESHOLD: f64 = 0.2;
/// Requests needed before the error rate is judged
const ERROR_RATE_MIN_REQUESTS: u64 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestMetrics {
    pub request_count: u64,
    pub total_time_ms: u64,
    pub average_time_ms: f64,
    pub errors: u64,
    pub last_request: Option<DateTime<Utc>>,
    #[serde(skip)]
    last_finished: Option<Instant>,
}

impl RequestMetrics {
    /// Share of requests that failed, 0 when none were made
    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.errors as f64 / self.request_count as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighFrequency,
    SlowResponse,
    ErrorRate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAlert {
    pub kind: AlertKind,
    pub name: String,
    pub message: String,
    pub metrics: RequestMetrics,
}

/// Name to metrics map
#[derive(Default)]
pub struct PerformanceTracker {
    entries: DashMap<String, RequestMetrics>,
}

static GLOBAL_TRACKER: OnceLock<Arc<PerformanceTracker>> = OnceLock::new();

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracker shared by every request in the process
    pub fn global() -> Arc<PerformanceTracker> {
        GLOBAL_TRACKER
            .get_or_init(|| Arc::new(PerformanceTracker::new()))
            .clone()
    }

    /// Record one finished request and return the alerts it raised
    pub fn record(&self, name: &str, duration: Duration, is_error: bool) -> Vec<PerformanceAlert> {
        let now = Instant::now();
        let snapshot = {
            let mut metrics = self.entries.entry(name.to_string()).or_default();
            let started = now.checked_sub(duration).unwrap_or(now);
            let burst = metrics
                .last_finished
                .is_some_and(|previous| {
                    started.saturating_duration_since(previous) < HIGH_FREQUENCY_WINDOW
                });

            metrics.request_count += 1;
            metrics.total_time_ms += duration.as_millis() as u64;
            metrics.average_time_ms = metrics.total_time_ms as f64 / metrics.request_count as f64;
            metrics.last_request = Some(Utc::now());
            metrics.last_finished = Some(now);
            if is_error {
                metrics.errors += 1;
            }
            (metrics.clone(), burst)
        };

        let (metrics, burst) = snapshot;
        let alerts = Self::check(name, &metrics, burst);
        for alert in &alerts {
            warn!(name, kind = ?alert.kind, "{}", alert.message);
        }
        alerts
    }

    fn check(name: &str, metrics: &RequestMetrics, burst: bool) -> Vec<PerformanceAlert> {
        let mut alerts = Vec::new();
        let mut raise = |kind, message: String| {
            alerts.push(PerformanceAlert {
                kind,
                name: name.to_string(),
                message,
                metrics: metrics.clone(),
            })
        };

        if metrics.request_count > 1 && burst {
            raise(
                AlertKind::HighFrequency,
                format!(
                    "{}: High request frequency detected ({} requests)",
                    name, metrics.request_count
                ),
            );
        }
        if metrics.average_time_ms > SLOW_RESPONSE_THRESHOLD.as_millis() as f64 {
            raise(
                AlertKind::SlowResponse,
                format!(
                    "{}: Slow response time ({:.2}ms average)",
                    name, metrics.average_time_ms
                ),
            );
        }
        if metrics.request_count > ERROR_RATE_MIN_REQUESTS
            && metrics.error_rate() > ERROR_RATE_THRESHOLD
        {
            raise(
                AlertKind::ErrorRate,
                format!(
                    "{}: High error rate ({:.1}%)",
                    name,
                    metrics.error_rate() * 100.0
                ),
            );
        }
        alerts
    }

    pub fn get(&self, name: &str) -> Option<RequestMetrics> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn get_all(&self) -> HashMap<String, RequestMetrics> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Zero the counters for one name
    pub fn reset(&self, name: &str) {
        self.entries.insert(name.to_string(), RequestMetrics::default());
    }

    pub fn reset_all(&self) {
        self.entries.clear();
    }

    /// Log a summary line per tracked name
    pub fn log_metrics(&self) {
        for (name, metrics) in self.get_all() {
            info!(
                name = %name,
                requests = metrics.request_count,
                avg_time_ms = %format!("{:.2}", metrics.average_time_ms),
                errors = metrics.errors,
                error_rate = %format!("{:.1}%", metrics.error_rate() * 100.0),
                "Request metrics"
            );
        }
    }
}
