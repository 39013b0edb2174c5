//! Resilience helpers wrapped around real service calls
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use http::Method;
use serde_json::json;

use budget_client::api::models::DateRange;
use budget_client::common::circuit_breaker::{CircuitBreakerConfig, CircuitPhase};
use budget_client::common::dedup::{DedupOptions, DedupRequest, RequestCache, CACHE_TTL};
use budget_client::common::CircuitBreaker;
use budget_client::ClientError;

use crate::test_harness::{url, TestEnvironment};

fn stats_json() -> serde_json::Value {
    json!({
        "total_income": "100.00",
        "total_expenses": "40.00",
        "net_income": "60.00",
        "transaction_count": 3
    })
}

#[tokio::test(start_paused = true)]
async fn test_dedup_shares_calls_across_hooks_until_ttl() -> Result<()> {
    let env = TestEnvironment::new();
    env.http
        .mock_json(Method::GET, url("/transactions/stats"), 200, &stats_json())?;
    let cache = Arc::new(RequestCache::new());

    let make_hook = || {
        let transactions = env.client.transactions();
        DedupRequest::with_cache(
            cache.clone(),
            move || {
                let transactions = transactions.clone();
                async move { transactions.stats(&DateRange::default()).await }
            },
            DedupOptions::default().with_key("stats"),
        )
    };
    let header = make_hook();
    let sidebar = make_hook();

    let (a, b) = tokio::join!(header.execute(false), sidebar.execute(false));
    assert_eq!(a?, b?);
    assert_eq!(env.count(Method::GET, "/transactions/stats"), 1);

    tokio::time::advance(CACHE_TTL + Duration::from_millis(1)).await;
    sidebar.execute(false).await?;
    assert_eq!(env.count(Method::GET, "/transactions/stats"), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dedup_retries_transient_server_errors() -> Result<()> {
    let env = TestEnvironment::new();
    let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = attempts.clone();
    env.http.mock_with(Method::GET, url("/budgets/alerts"), move |_| {
        let n = seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let response = if n < 2 {
            budget_client::adapters::SimpleHttpResponse::new(502, "")
        } else {
            budget_client::adapters::SimpleHttpResponse::new(200, "[]")
        };
        Ok(response)
    });

    let budgets = env.client.budgets();
    let hook = DedupRequest::with_cache(
        Arc::new(RequestCache::new()),
        move || {
            let budgets = budgets.clone();
            async move { budgets.alerts().await }
        },
        DedupOptions::default()
            .with_key("alerts")
            .with_retry_delay(Duration::from_millis(200)),
    );

    let alerts = hook.execute(false).await?;
    assert!(alerts.is_empty());
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_breaker_stops_calling_failing_endpoint() -> Result<()> {
    let env = TestEnvironment::new();
    env.http
        .mock_response(Method::GET, url("/budgets/active"), 503, "");
    let budgets = env.client.budgets();
    let breaker = CircuitBreaker::new(
        "budgets",
        CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_time: Duration::from_secs(15),
            request_timeout: Duration::from_secs(5),
        },
    );

    for _ in 0..2 {
        let err = breaker.execute(|| budgets.active()).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
    let err = breaker.execute(|| budgets.active()).await.unwrap_err();
    assert!(matches!(err, ClientError::CircuitOpen { .. }));
    assert_eq!(env.count(Method::GET, "/budgets/active"), 2);

    env.http
        .mock_json(Method::GET, url("/budgets/active"), 200, &json!([]))?;
    tokio::time::advance(Duration::from_secs(15)).await;
    breaker.execute(|| budgets.active()).await?;
    assert_eq!(breaker.state().phase, CircuitPhase::Closed);
    assert_eq!(breaker.state().failure_count, 0);
    Ok(())
}
