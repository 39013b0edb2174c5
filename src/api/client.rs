use std::sync::Arc;

use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::adapters::http_client::{HttpClient, HttpRequest, SimpleHttpResponse};
use crate::api::refresh::{RefreshCoordinator, REFRESH_PATH};
use crate::auth::storage::TokenStore;
use crate::auth::token::AuthEvent;
use crate::error::{ClientError, ClientResult};

/// Capacity of the auth event channel
const AUTH_EVENT_CAPACITY: usize = 32;

/// Authenticated request pipeline.
///
/// Attaches the stored bearer token to every call. A 401 is answered once
/// per request: the pipeline obtains a fresh access token (joining any
/// refresh that is already running) and replays the request with it. Any
/// other status is handed back unchanged as an error.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Arc<dyn HttpClient>,
    base_url: String,
    tokens: TokenStore,
    refresh: RefreshCoordinator,
    events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    /// Create a pipeline against `base_url` using the given transport and token store
    pub fn new(http: Arc<dyn HttpClient>, base_url: &str, tokens: TokenStore) -> ClientResult<Self> {
        let parsed = Url::parse(base_url)?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::Config {
                key: "api_base_url".to_string(),
                reason: format!("'{}' cannot be used as a base URL", base_url),
            });
        }

        let base_url = base_url.trim_end_matches('/').to_string();
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        let refresh = RefreshCoordinator::new(
            Arc::clone(&http),
            format!("{}{}", base_url, REFRESH_PATH),
            tokens.clone(),
            events.clone(),
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                tokens,
                refresh,
                events,
            }),
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Token store used by the pipeline
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Underlying transport
    pub fn http(&self) -> Arc<dyn HttpClient> {
        Arc::clone(&self.inner.http)
    }

    /// Subscribe to auth events (login required, refreshed, logged out)
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Publish an auth event to subscribers
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Obtain a new access token through the single-flight refresh
    pub async fn refresh_tokens(&self) -> ClientResult<String> {
        self.inner.refresh.refresh().await
    }

    /// Whether a token refresh is currently outstanding
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.is_refreshing()
    }

    /// Build an absolute URL for `path` with optional query parameters
    pub fn url(&self, path: &str, query: Option<&Value>) -> ClientResult<String> {
        let mut url = Url::parse(&format!("{}{}", self.inner.base_url, path))?;

        if let Some(Value::Object(params)) = query {
            let pairs: Vec<(&String, String)> = params
                .iter()
                .filter_map(|(key, value)| match value {
                    Value::Null => None,
                    Value::String(s) => Some((key, s.clone())),
                    other => Some((key, other.to_string())),
                })
                .collect();

            if !pairs.is_empty() {
                let mut serializer = url.query_pairs_mut();
                for (key, value) in pairs {
                    serializer.append_pair(key, &value);
                }
            }
        }

        Ok(url.to_string())
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        query: Option<&Value>,
        body: Option<&Value>,
    ) -> ClientResult<HttpRequest> {
        let mut request =
            HttpRequest::new(method, self.url(path, query)?).with_header("Accept", "application/json");

        if let Some(body) = body {
            request = request
                .with_header("Content-Type", "application/json")
                .with_body(body.to_string());
        }

        Ok(request)
    }

    async fn dispatch(&self, request: &HttpRequest, token: Option<&str>) -> ClientResult<SimpleHttpResponse> {
        let mut request = request.clone();
        if let Some(token) = token {
            request
                .headers
                .insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        self.inner.http.send(request).await
    }

    /// Send a request through the authenticated pipeline
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<&Value>,
        body: Option<&Value>,
    ) -> ClientResult<SimpleHttpResponse> {
        let request = self.build_request(method, path, query, body)?;
        self.send_authenticated(request).await
    }

    /// Send a request without credentials and without the refresh protocol
    pub async fn send_public(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ClientResult<SimpleHttpResponse> {
        let request = self.build_request(method, path, None, body)?;
        debug!(method = %request.method, url = %request.url, "Sending public request");
        self.dispatch(&request, None).await?.error_for_status()
    }

    async fn send_authenticated(&self, request: HttpRequest) -> ClientResult<SimpleHttpResponse> {
        let request_id = Uuid::new_v4();
        let sent_with = self.inner.tokens.get_access_token().await;

        let response = self.dispatch(&request, sent_with.as_deref()).await?;
        debug!(
            %request_id,
            method = %request.method,
            url = %request.url,
            status = response.status(),
            "Request completed"
        );

        if !response.is_unauthorized() {
            return response.error_for_status();
        }

        // The token may have been rotated while this request was on the wire
        let fresh = match self.inner.tokens.get_access_token().await {
            Some(current) if sent_with.as_deref() != Some(current.as_str()) => {
                debug!(%request_id, "Access token already rotated, replaying request");
                current
            }
            _ => {
                debug!(%request_id, "Received 401, refreshing access token");
                self.inner.refresh.refresh().await.map_err(|e| {
                    warn!(%request_id, error = %e, "Request abandoned after failed refresh");
                    e
                })?
            }
        };

        let replayed = self.dispatch(&request, Some(&fresh)).await?;
        debug!(
            %request_id,
            status = replayed.status(),
            "Replayed request with refreshed token"
        );
        replayed.error_for_status()
    }

    /// GET and decode JSON
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(Method::GET, path, None, None).await?.json()
    }

    /// GET with query parameters and decode JSON
    pub async fn get_with<T, Q>(&self, path: &str, query: &Q) -> ClientResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let query = serde_json::to_value(query)?;
        self.send(Method::GET, path, Some(&query), None).await?.json()
    }

    /// POST a JSON body and decode JSON
    pub async fn post<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, None, Some(&body)).await?.json()
    }

    /// PUT a JSON body and decode JSON
    pub async fn put<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, path, None, Some(&body)).await?.json()
    }

    /// PATCH a JSON body and decode JSON
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::PATCH, path, None, Some(&body)).await?.json()
    }

    /// DELETE, ignoring any response body
    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        self.send(Method::DELETE, path, None, None).await?;
        Ok(())
    }
}
