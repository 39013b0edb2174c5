//! Real HTTP round trips through reqwest against a mockito server
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use budget_client::adapters::ReqwestHttpClient;
use budget_client::api::models::UserLogin;
use budget_client::auth::TokenStore;
use budget_client::{BudgetClient, ClientConfig};

use crate::test_harness::{token_json, user_json};

fn client_for(server: &mockito::ServerGuard, tokens: TokenStore) -> Result<BudgetClient> {
    let config = ClientConfig {
        api_base_url: server.url(),
        token_store_path: None,
        ..ClientConfig::default()
    };
    let http = Arc::new(ReqwestHttpClient::new(Duration::from_secs(5))?);
    Ok(BudgetClient::with_transport(config, http, tokens)?)
}

#[tokio::test]
async fn test_login_over_http() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("POST", "/auth/login")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::Json(json!({
            "email": "ada@example.com",
            "password": "Secret123"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_json("a1", "r1").to_string())
        .create_async()
        .await;
    let me = server
        .mock("GET", "/users/me")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(user_json().to_string())
        .create_async()
        .await;

    let client = client_for(&server, TokenStore::in_memory())?;
    let user = client
        .session()
        .login(&UserLogin {
            email: "ada@example.com".into(),
            password: "Secret123".into(),
        })
        .await?;

    assert_eq!(user.email, "ada@example.com");
    login.assert_async().await;
    me.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_replayed_over_http() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let rejected = server
        .mock("GET", "/categories/with-stats")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .with_body(json!({"detail": "Token expired"}).to_string())
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .match_body(mockito::Matcher::Json(json!({"refresh_token": "r1"})))
        .with_status(200)
        .with_body(token_json("new", "r2").to_string())
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/categories/with-stats")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let tokens = TokenStore::in_memory();
    tokens.set_tokens("old", "r1").await;
    let client = client_for(&server, tokens.clone())?;

    let categories = client.categories().with_stats().await?;

    assert!(categories.is_empty());
    assert_eq!(tokens.get_refresh_token().await.as_deref(), Some("r2"));
    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_server_detail_is_surfaced_over_http() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/budgets/b404")
        .with_status(404)
        .with_body(json!({"detail": "Budget not found"}).to_string())
        .create_async()
        .await;

    let client = client_for(&server, TokenStore::in_memory())?;
    let err = client.budgets().get("b404").await.unwrap_err();
    assert_eq!(err.to_string(), "Budget not found");
    assert_eq!(err.status(), Some(404));
    Ok(())
}
