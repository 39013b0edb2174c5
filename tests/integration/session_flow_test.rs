//! Session scenarios driven through the public client
use anyhow::Result;
use http::Method;

use budget_client::api::models::{UserLogin, UserUpdate};
use budget_client::ClientError;

use crate::test_harness::{jwt, token_json, url, user_json, TestEnvironment};

#[tokio::test]
async fn test_login_populates_session() -> Result<()> {
    let env = TestEnvironment::new();
    let access = jwt(3600);
    env.http
        .mock_json(Method::POST, url("/auth/login"), 200, &token_json(&access, "r1"))?;
    env.serve_profile_for(&access);

    let session = env.client.session();
    assert!(session.session().is_loading);

    session
        .login(&UserLogin {
            email: "ada@example.com".into(),
            password: "Secret123".into(),
        })
        .await?;

    let state = session.session();
    assert!(state.is_authenticated);
    assert_eq!(state.user.map(|u| u.full_name), Some("Ada Lovelace".to_string()));
    assert_eq!(env.tokens.get_access_token().await, Some(access));
    assert_eq!(env.tokens.get_refresh_token().await.as_deref(), Some("r1"));
    Ok(())
}

#[tokio::test]
async fn test_startup_with_expiring_token_refreshes_silently() -> Result<()> {
    let env = TestEnvironment::new();
    let fresh = jwt(3600);
    env.tokens.set_tokens(&jwt(60), "r1").await;
    env.http
        .mock_json(Method::POST, url("/auth/refresh"), 200, &token_json(&fresh, "r2"))?;
    env.serve_profile_for(&fresh);

    let user = env.client.session().check_auth().await?;

    assert_eq!(user.id, "u1");
    assert_eq!(env.count(Method::POST, "/auth/refresh"), 1);
    assert_eq!(env.count(Method::GET, "/users/me"), 1);
    assert_eq!(env.client.session().session().error, None);
    Ok(())
}

#[tokio::test]
async fn test_startup_with_valid_token_skips_refresh() -> Result<()> {
    let env = TestEnvironment::new();
    let access = jwt(3600);
    env.tokens.set_tokens(&access, "r1").await;
    env.serve_profile_for(&access);

    env.client.session().check_auth().await?;
    assert_eq!(env.count(Method::POST, "/auth/refresh"), 0);
    Ok(())
}

#[tokio::test]
async fn test_rejected_profile_clears_tokens() -> Result<()> {
    let env = TestEnvironment::new();
    env.tokens.set_tokens(&jwt(3600), "r1").await;
    env.http
        .mock_error(Method::GET, url("/users/me"), 403, "Inactive user");

    let err = env.client.session().check_auth().await.unwrap_err();

    assert_eq!(err, ClientError::Api { status: 403, message: "Inactive user".into() });
    assert!(!env.tokens.has_valid_tokens().await);
    assert_eq!(
        env.client.session().session().error.as_deref(),
        Some("Inactive user")
    );
    Ok(())
}

#[tokio::test]
async fn test_profile_update_replaces_user() -> Result<()> {
    let env = TestEnvironment::new();
    let access = jwt(3600);
    env.tokens.set_tokens(&access, "r1").await;
    env.serve_profile_for(&access);

    let mut updated = user_json();
    updated["full_name"] = "Ada King".into();
    env.http.mock_json(Method::PUT, url("/users/me"), 200, &updated)?;

    let session = env.client.session();
    session.check_auth().await?;
    session
        .update_profile(&UserUpdate {
            full_name: Some("Ada King".into()),
            ..Default::default()
        })
        .await?;

    let state = session.session();
    assert!(state.is_authenticated);
    assert!(!state.is_loading);
    assert_eq!(state.user.map(|u| u.full_name), Some("Ada King".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_logout_without_refresh_token_skips_server() -> Result<()> {
    let env = TestEnvironment::new();
    env.tokens.set_access_token(&jwt(3600)).await;

    env.client.session().logout().await;

    assert_eq!(env.count(Method::POST, "/auth/logout"), 0);
    assert_eq!(env.tokens.get_access_token().await, None);
    assert!(!env.client.session().session().is_authenticated);
    Ok(())
}
