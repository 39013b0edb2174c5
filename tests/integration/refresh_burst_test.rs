//! Concurrent 401 handling through the typed services
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use http::Method;
use serde_json::json;

use budget_client::adapters::{MockHttpClient, SimpleHttpResponse};
use budget_client::api::models::TransactionFilters;
use budget_client::{AuthEvent, ClientError};

use crate::test_harness::{token_json, url, TestEnvironment};

fn serve_transactions_for(http: &MockHttpClient, access_token: &'static str) {
    let expected = format!("Bearer {}", access_token);
    http.mock_with(Method::GET, url("/transactions/"), move |req| {
        let status = if req.authorization() == Some(expected.as_str()) {
            200
        } else {
            401
        };
        let body = if status == 200 {
            json!([]).to_string()
        } else {
            json!({"detail": "Token expired"}).to_string()
        };
        Ok(SimpleHttpResponse::new(status, body))
    });
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_401s_refreshes_once() -> Result<()> {
    let http = MockHttpClient::new().with_latency(Duration::from_millis(25));
    let env = TestEnvironment::with_http(http);
    env.tokens.set_tokens("stale", "r1").await;
    env.http
        .mock_json(Method::POST, url("/auth/refresh"), 200, &token_json("fresh", "r2"))?;
    serve_transactions_for(&env.http, "fresh");

    let transactions = env.client.transactions();
    let filters = TransactionFilters::default();
    let results = join_all((0..6).map(|_| transactions.list(&filters))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(env.count(Method::POST, "/auth/refresh"), 1);
    assert_eq!(env.tokens.get_access_token().await.as_deref(), Some("fresh"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_rejects_everyone_and_signals_once() -> Result<()> {
    let http = MockHttpClient::new().with_latency(Duration::from_millis(25));
    let env = TestEnvironment::with_http(http);
    env.tokens.set_tokens("stale", "revoked").await;
    env.http
        .mock_error(Method::POST, url("/auth/refresh"), 401, "Invalid refresh token");
    serve_transactions_for(&env.http, "never-issued");
    let mut events = env.client.api().subscribe();

    let transactions = env.client.transactions();
    let filters = TransactionFilters::default();
    let results = join_all((0..5).map(|_| transactions.list(&filters))).await;

    for result in &results {
        assert!(matches!(result, Err(ClientError::RefreshFailed { .. })));
    }
    assert_eq!(env.count(Method::POST, "/auth/refresh"), 1);
    assert!(!env.tokens.has_valid_tokens().await);

    assert!(matches!(events.try_recv(), Ok(AuthEvent::LoginRequired { .. })));
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_missing_refresh_token_requires_login() -> Result<()> {
    let env = TestEnvironment::new();
    env.tokens.set_access_token("stale").await;
    serve_transactions_for(&env.http, "fresh");
    let mut events = env.client.api().subscribe();

    let err = env
        .client
        .transactions()
        .list(&TransactionFilters::default())
        .await
        .unwrap_err();

    assert_eq!(err, ClientError::NoRefreshToken);
    assert!(err.is_session_fatal());
    assert_eq!(env.count(Method::POST, "/auth/refresh"), 0);
    assert!(matches!(events.try_recv(), Ok(AuthEvent::LoginRequired { .. })));
    Ok(())
}
