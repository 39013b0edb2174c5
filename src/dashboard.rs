//! Overview data for the home screen.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, warn};

use crate::api::client::ApiClient;
use crate::api::models::{
    BudgetProgress, BudgetProgressFilters, DateRange, Transaction, TransactionFilters,
    TransactionStats,
};
use crate::api::{BudgetsApi, TransactionsApi};
use crate::common::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState};
use crate::common::dedup::{DedupOptions, DedupRequest, RequestCache};
use crate::common::metrics::{PerformanceTracker, RequestMetrics};
use crate::error::ClientResult;

/// Cache key for the dashboard statistics
pub const STATS_KEY: &str = "dashboard:transaction-stats";
/// Number of transactions shown as recent activity
pub const RECENT_TRANSACTION_LIMIT: u32 = 5;

/// Breaker tuned for the dashboard: trips faster and recovers sooner than
/// the default
pub fn dashboard_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        recovery_time: Duration::from_secs(15),
        request_timeout: Duration::from_secs(5),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub stats: TransactionStats,
    pub recent_transactions: Vec<Transaction>,
    pub budget_progress: Vec<BudgetProgress>,
}

pub struct Dashboard {
    transactions: TransactionsApi,
    budgets: BudgetsApi,
    breaker: Arc<CircuitBreaker>,
    stats: DedupRequest<TransactionStats>,
}

impl Dashboard {
    pub fn new(client: ApiClient, dedup: DedupOptions) -> Self {
        Self::with_shared(
            client,
            RequestCache::global(),
            PerformanceTracker::global(),
            dashboard_breaker_config(),
            dedup,
        )
    }

    /// Build over an explicit request cache and performance tracker
    pub fn with_shared(
        client: ApiClient,
        cache: Arc<RequestCache>,
        tracker: Arc<PerformanceTracker>,
        breaker: CircuitBreakerConfig,
        dedup: DedupOptions,
    ) -> Self {
        let transactions = TransactionsApi::new(client.clone());
        let breaker = Arc::new(CircuitBreaker::new("dashboard", breaker));

        let stats = {
            let transactions = transactions.clone();
            let breaker = breaker.clone();
            DedupRequest::with_cache(
                cache,
                move || {
                    let transactions = transactions.clone();
                    let breaker = breaker.clone();
                    async move {
                        let range = DateRange::default();
                        breaker.execute(|| transactions.stats(&range)).await
                    }
                },
                dedup.with_key(STATS_KEY),
            )
            .with_tracker(tracker)
        };

        Self {
            transactions,
            budgets: BudgetsApi::new(client),
            breaker,
            stats,
        }
    }

    /// Transaction totals, guarded by the breaker and shared across callers
    pub async fn stats(&self, force_refresh: bool) -> ClientResult<TransactionStats> {
        self.stats.execute(force_refresh).await
    }

    pub fn breaker_state(&self) -> CircuitBreakerState {
        self.breaker.state()
    }

    /// Timing and error counts for the statistics request
    pub fn stats_metrics(&self) -> Option<RequestMetrics> {
        self.stats.tracker().get(STATS_KEY)
    }

    /// Load everything the overview shows.
    ///
    /// Statistics failures are returned. Recent activity and budget progress
    /// are secondary: a failure there is logged and shown as empty.
    pub async fn load(&self, force_refresh: bool) -> ClientResult<DashboardSummary> {
        let recent_filters = TransactionFilters {
            limit: Some(RECENT_TRANSACTION_LIMIT),
            ..Default::default()
        };
        let progress_filters = BudgetProgressFilters::default();

        let (stats, recent, progress) = tokio::join!(
            self.stats(force_refresh),
            self.transactions.list(&recent_filters),
            self.budgets.progress(&progress_filters),
        );

        let stats = stats.map_err(|e| {
            warn!(
                error = %e,
                breaker = %self.breaker.state().phase,
                "Dashboard statistics unavailable"
            );
            e
        })?;

        let recent_transactions = recent.unwrap_or_else(|e| {
            error!(error = %e, "Error loading recent transactions");
            Vec::new()
        });
        let budget_progress = progress.unwrap_or_else(|e| {
            error!(error = %e, "Error loading budget progress");
            Vec::new()
        });

        Ok(DashboardSummary {
            stats,
            recent_transactions,
            budget_progress,
        })
    }
}
