use http::Method;
use tracing::{debug, info};

use crate::api::client::ApiClient;
use crate::api::models::{
    RefreshTokenRequest, TokenResponse, User, UserCreate, UserLogin, UserUpdate,
};
use crate::api::refresh::{request_token_refresh, REFRESH_PATH};
use crate::error::ClientResult;
use crate::validation;

/// Authentication and current-user endpoints.
///
/// Register, login and refresh go out without credentials; everything else
/// uses the authenticated pipeline.
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, user: &UserCreate) -> ClientResult<User> {
        validation::validate_registration(user)?;
        let body = serde_json::to_value(user)?;
        let user: User = self
            .client
            .send_public(Method::POST, "/auth/register", Some(&body))
            .await?
            .json()?;
        info!(user_id = %user.id, "Registered new user");
        Ok(user)
    }

    /// Exchange credentials for a token pair
    pub async fn login(&self, credentials: &UserLogin) -> ClientResult<TokenResponse> {
        validation::validate_login(credentials)?;
        let body = serde_json::to_value(credentials)?;
        debug!(email = %credentials.email, "Logging in");
        self.client
            .send_public(Method::POST, "/auth/login", Some(&body))
            .await?
            .json()
    }

    /// Exchange a refresh token directly, bypassing the single-flight slot
    pub async fn refresh_token(&self, refresh_token: &str) -> ClientResult<TokenResponse> {
        let url = self.client.url(REFRESH_PATH, None)?;
        request_token_refresh(self.client.http().as_ref(), &url, refresh_token).await
    }

    /// Revoke a refresh token on the server
    pub async fn logout(&self, refresh_token: &str) -> ClientResult<()> {
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        let body = serde_json::to_value(&body)?;
        self.client
            .send(Method::POST, "/auth/logout", None, Some(&body))
            .await?;
        Ok(())
    }

    pub async fn current_user(&self) -> ClientResult<User> {
        self.client.get("/users/me").await
    }

    pub async fn update_profile(&self, update: &UserUpdate) -> ClientResult<User> {
        validation::validate_user_update(update)?;
        self.client.put("/users/me", update).await
    }

    pub async fn delete_account(&self) -> ClientResult<()> {
        self.client.delete("/users/me").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http_client::mock::MockHttpClient;
    use crate::auth::storage::TokenStore;
    use crate::error::ClientError;
    use serde_json::json;
    use std::sync::Arc;

    fn user_json() -> serde_json::Value {
        json!({
            "id": "u1",
            "email": "ada@example.com",
            "full_name": "Ada Lovelace",
            "is_active": true,
            "is_verified": false,
            "created_at": "2024-01-01T00:00:00",
            "updated_at": "2024-01-01T00:00:00"
        })
    }

    fn api(http: &MockHttpClient, tokens: TokenStore) -> AuthApi {
        let client = ApiClient::new(Arc::new(http.clone()), "https://api.test", tokens).unwrap();
        AuthApi::new(client)
    }

    #[tokio::test]
    async fn test_login_is_sent_without_bearer() {
        let http = MockHttpClient::new();
        http.mock_json(
            Method::POST,
            "https://api.test/auth/login",
            200,
            &json!({"access_token": "a", "refresh_token": "r", "token_type": "bearer"}),
        )
        .unwrap();
        let tokens = TokenStore::in_memory();
        tokens.set_tokens("old", "old-r").await;

        let response = api(&http, tokens)
            .login(&UserLogin {
                email: "ada@example.com".into(),
                password: "Secret123".into(),
            })
            .await
            .unwrap();

        assert_eq!(response.access_token, "a");
        let requests = http.get_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].authorization(), None);
    }

    #[tokio::test]
    async fn test_wrong_password_surfaces_detail() {
        let http = MockHttpClient::new();
        http.mock_error(
            Method::POST,
            "https://api.test/auth/login",
            401,
            "Incorrect email or password",
        );

        let err = api(&http, TokenStore::in_memory())
            .login(&UserLogin {
                email: "ada@example.com".into(),
                password: "nope".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::Unauthorized("Incorrect email or password".into()));
        assert_eq!(http.count_requests(&Method::POST, "https://api.test/auth/refresh"), 0);
    }

    #[tokio::test]
    async fn test_invalid_registration_never_hits_network() {
        let http = MockHttpClient::new();
        let result = api(&http, TokenStore::in_memory())
            .register(&UserCreate {
                email: "not-an-email".into(),
                full_name: "Ada".into(),
                password: "Secret123".into(),
            })
            .await;

        assert!(matches!(result, Err(ClientError::Validation(_))));
        assert!(http.get_requests().is_empty());
    }

    #[tokio::test]
    async fn test_logout_posts_refresh_token() {
        let http = MockHttpClient::new();
        http.mock_json(Method::POST, "https://api.test/auth/logout", 200, &json!({"message": "ok"}))
            .unwrap();
        let tokens = TokenStore::in_memory();
        tokens.set_tokens("a", "r").await;

        api(&http, tokens).logout("r").await.unwrap();

        let requests = http.get_requests();
        assert_eq!(requests[0].authorization(), Some("Bearer a"));
        let body: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"refresh_token": "r"}));
    }

    #[tokio::test]
    async fn test_current_user_decodes() {
        let http = MockHttpClient::new();
        http.mock_json(Method::GET, "https://api.test/users/me", 200, &user_json())
            .unwrap();
        let user = api(&http, TokenStore::in_memory()).current_user().await.unwrap();
        assert_eq!(user.full_name, "Ada Lovelace");
    }
}
