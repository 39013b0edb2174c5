//! Shared fixtures for the integration tests

use std::sync::Arc;

use chrono::Utc;
use http::Method;
use serde_json::{json, Value};

use budget_client::adapters::MockHttpClient;
use budget_client::auth::token;
use budget_client::auth::TokenStore;
use budget_client::{BudgetClient, ClientConfig};

pub const BASE_URL: &str = "https://budget.test";

/// Absolute URL on the mocked API
pub fn url(path: &str) -> String {
    format!("{}{}", BASE_URL, path)
}

/// Unsigned token expiring `expires_in_secs` from now
pub fn jwt(expires_in_secs: i64) -> String {
    token::encode_unsigned(&json!({
        "exp": Utc::now().timestamp() + expires_in_secs,
        "iat": Utc::now().timestamp(),
        "user_id": "u1",
        "email": "ada@example.com"
    }))
}

pub fn user_json() -> Value {
    json!({
        "id": "u1",
        "email": "ada@example.com",
        "full_name": "Ada Lovelace",
        "is_active": true,
        "is_verified": true,
        "created_at": "2024-01-01T00:00:00",
        "updated_at": "2024-01-01T00:00:00"
    })
}

pub fn token_json(access: &str, refresh: &str) -> Value {
    json!({"access_token": access, "refresh_token": refresh, "token_type": "bearer"})
}

/// A client wired to a mock transport and an in-memory token store
pub struct TestEnvironment {
    pub http: MockHttpClient,
    pub tokens: TokenStore,
    pub client: BudgetClient,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_http(MockHttpClient::new())
    }

    pub fn with_http(http: MockHttpClient) -> Self {
        let tokens = TokenStore::in_memory();
        let config = ClientConfig {
            api_base_url: BASE_URL.to_string(),
            token_store_path: None,
            ..ClientConfig::default()
        };
        let client = BudgetClient::with_transport(config, Arc::new(http.clone()), tokens.clone())
            .expect("valid test configuration");
        Self {
            http,
            tokens,
            client,
        }
    }

    /// Serve `/users/me` only to requests bearing `access_token`
    pub fn serve_profile_for(&self, access_token: &str) {
        let expected = format!("Bearer {}", access_token);
        self.http.mock_with(Method::GET, url("/users/me"), move |req| {
            if req.authorization() == Some(expected.as_str()) {
                Ok(budget_client::adapters::SimpleHttpResponse::new(
                    200,
                    user_json().to_string(),
                ))
            } else {
                Ok(budget_client::adapters::SimpleHttpResponse::new(
                    401,
                    json!({"detail": "Could not validate credentials"}).to_string(),
                ))
            }
        });
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.http.count_requests(&method, &url(path))
    }
}
