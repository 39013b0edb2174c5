//! Single-flight access token refresh.
//!
//! While a refresh is outstanding its future sits in a shared slot. Every
//! request that hits a 401 in the meantime clones that future and awaits the
//! same outcome, so a burst of 401s costs exactly one call to `/auth/refresh`.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use http::Method;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::adapters::http_client::{HttpClient, HttpRequest};
use crate::api::models::{RefreshTokenRequest, TokenResponse};
use crate::auth::storage::TokenStore;
use crate::auth::token::AuthEvent;
use crate::error::{ClientError, ClientResult};

/// Path of the refresh endpoint
pub const REFRESH_PATH: &str = "/auth/refresh";

type RefreshFuture = Shared<BoxFuture<'static, ClientResult<String>>>;

/// Exchange a refresh token for a new pair without touching any stored state
pub async fn request_token_refresh(
    http: &dyn HttpClient,
    refresh_url: &str,
    refresh_token: &str,
) -> ClientResult<TokenResponse> {
    let body = serde_json::to_string(&RefreshTokenRequest {
        refresh_token: refresh_token.to_string(),
    })?;

    let request = HttpRequest::new(Method::POST, refresh_url)
        .with_header("Content-Type", "application/json")
        .with_header("Accept", "application/json")
        .with_body(body);

    http.send(request).await?.error_for_status()?.json()
}

/// Coordinates token refreshes so that only one runs at a time
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

struct RefreshInner {
    http: Arc<dyn HttpClient>,
    refresh_url: String,
    tokens: TokenStore,
    events: broadcast::Sender<AuthEvent>,
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl RefreshCoordinator {
    pub fn new(
        http: Arc<dyn HttpClient>,
        refresh_url: impl Into<String>,
        tokens: TokenStore,
        events: broadcast::Sender<AuthEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                http,
                refresh_url: refresh_url.into(),
                tokens,
                events,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Whether a refresh is currently outstanding
    pub fn is_refreshing(&self) -> bool {
        self.inner.slot().is_some()
    }

    /// Join the outstanding refresh, or start one.
    ///
    /// Resolves to the new access token. On failure the stored tokens have
    /// already been cleared and `AuthEvent::LoginRequired` has been sent once
    /// for the whole burst.
    pub async fn refresh(&self) -> ClientResult<String> {
        let refresh = {
            let mut slot = self.inner.slot();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    debug!("Starting token refresh");
                    let started = Arc::clone(&self.inner).run().boxed().shared();
                    *slot = Some(started.clone());
                    started
                }
            }
        };

        refresh.await
    }
}

impl RefreshInner {
    fn slot(&self) -> std::sync::MutexGuard<'_, Option<RefreshFuture>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run(self: Arc<Self>) -> ClientResult<String> {
        let result = self.perform().await;
        self.slot().take();
        result
    }

    async fn perform(&self) -> ClientResult<String> {
        let refresh_token = match self.tokens.get_refresh_token().await {
            Some(token) if !token.is_empty() => token,
            _ => {
                warn!("No refresh token available, login required");
                self.tokens.clear_tokens().await;
                self.emit(AuthEvent::LoginRequired {
                    reason: ClientError::NoRefreshToken.to_string(),
                });
                return Err(ClientError::NoRefreshToken);
            }
        };

        match request_token_refresh(self.http.as_ref(), &self.refresh_url, &refresh_token).await {
            Ok(response) => {
                self.tokens
                    .set_tokens(&response.access_token, &response.refresh_token)
                    .await;
                info!("Access token refreshed");
                self.emit(AuthEvent::TokensRefreshed);
                Ok(response.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.tokens.clear_tokens().await;
                let err = ClientError::RefreshFailed {
                    reason: e.to_string(),
                };
                self.emit(AuthEvent::LoginRequired {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
