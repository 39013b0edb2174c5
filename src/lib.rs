pub mod adapters;
pub mod api;
pub mod auth;
pub mod common;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod validation;

use std::sync::Arc;

use tracing::debug;

use crate::adapters::http_client::{HttpClient, ReqwestHttpClient};
use crate::api::{ApiClient, AuthApi, BudgetsApi, CategoriesApi, TransactionsApi};
use crate::auth::{SessionController, TokenStore};
use crate::common::{CircuitBreaker, PerformanceTracker};
use crate::dashboard::Dashboard;

// Re-export core components
pub use crate::auth::{AuthEvent, Session};
pub use crate::config::ClientConfig;
pub use crate::error::{ClientError, ClientResult, ErrorCategory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything needed to talk to the budget tracker API, wired from one config
#[derive(Clone)]
pub struct BudgetClient {
    config: ClientConfig,
    api: ApiClient,
    session: Arc<SessionController>,
}

impl BudgetClient {
    /// Build a client with the reqwest transport and the configured token store
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = Arc::new(ReqwestHttpClient::new(config.request_timeout())?);
        let tokens = match &config.token_store_path {
            Some(path) => {
                debug!(path = %path.display(), "Using file token store");
                TokenStore::file(path)
            }
            None => TokenStore::in_memory(),
        };
        Self::with_transport(config, http, tokens)
    }

    /// Build a client over any transport and token store.
    ///
    /// Inside a tokio runtime the session also follows pipeline events, so a
    /// failed background refresh signs it out.
    pub fn with_transport(
        config: ClientConfig,
        http: Arc<dyn HttpClient>,
        tokens: TokenStore,
    ) -> ClientResult<Self> {
        let api = ApiClient::new(http, &config.api_base_url, tokens)?;
        let session = Arc::new(SessionController::new(api.clone()));
        if tokio::runtime::Handle::try_current().is_ok() {
            session.spawn_event_listener();
        }
        Ok(Self {
            config,
            api,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The authenticated request pipeline
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.api.clone())
    }

    pub fn transactions(&self) -> TransactionsApi {
        TransactionsApi::new(self.api.clone())
    }

    pub fn categories(&self) -> CategoriesApi {
        CategoriesApi::new(self.api.clone())
    }

    pub fn budgets(&self) -> BudgetsApi {
        BudgetsApi::new(self.api.clone())
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::new(self.api.clone(), self.config.dedup.to_options())
    }

    /// Request timings and error counts collected by de-duplicated requests
    pub fn metrics(&self) -> Arc<PerformanceTracker> {
        PerformanceTracker::global()
    }

    /// A breaker using the configured thresholds
    pub fn circuit_breaker(&self, name: &str) -> CircuitBreaker {
        CircuitBreaker::new(name, self.config.breaker.to_config())
    }
}
