use std::collections::HashMap;
use std::time::Duration;

use http::Method;
use tracing::trace;

use crate::error::{ClientError, ClientResult};

/// An outbound request as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including any query string
    pub url: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Serialized JSON body
    pub body: Option<String>,
}

impl HttpRequest {
    /// Create a request without headers or body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Value of the Authorization header, if set
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("Authorization").map(String::as_str)
    }
}

/// A very simple version that only holds response data
#[derive(Debug, Clone)]
pub struct SimpleHttpResponse {
    /// HTTP status code
    status_code: u16,
    /// Response body
    body: String,
    /// Response headers
    headers: HashMap<String, String>,
}

impl SimpleHttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status_code: status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get the status code
    pub fn status(&self) -> u16 {
        self.status_code
    }

    /// Get a reference to the response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Get a response header
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Get the body as text (consumes the response)
    pub fn text(self) -> String {
        self.body
    }

    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> ClientResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Check if successful (2xx status)
    pub fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }

    /// Check for a 401
    pub fn is_unauthorized(&self) -> bool {
        self.status_code == 401
    }

    /// Turn a non-2xx response into the matching error
    pub fn error_for_status(self) -> ClientResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::from_response(self.status_code, &self.body))
        }
    }
}

/// Trait for HTTP client operations, allowing for mocking
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request and return the raw response, whatever its status
    async fn send(&self, request: HttpRequest) -> ClientResult<SimpleHttpResponse>;
}

/// Implementation of HttpClient using reqwest
pub struct ReqwestHttpClient {
    /// Internal reqwest client
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new client with a whole-request timeout
    pub fn new(timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create a new client with custom configuration
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> ClientResult<SimpleHttpResponse> {
        trace!(method = %request.method, url = %request.url, "Sending HTTP request");

        let mut builder = self.client.request(request.method, &request.url);

        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.text().await?;

        Ok(headers
            .into_iter()
            .fold(SimpleHttpResponse::new(status, body), |resp, (k, v)| {
                resp.with_header(k, v)
            }))
    }
}

/// Mock implementation of HttpClient for tests
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Computes a response from the incoming request
    pub type Responder = Arc<dyn Fn(&HttpRequest) -> ClientResult<SimpleHttpResponse> + Send + Sync>;

    /// A mock HTTP client that returns predefined responses
    #[derive(Clone, Default)]
    pub struct MockHttpClient {
        /// Responders keyed by method and URL
        routes: Arc<Mutex<HashMap<(Method, String), Responder>>>,
        /// Record of requests made
        requests: Arc<Mutex<Vec<HttpRequest>>>,
        /// Simulated network latency applied to every call
        latency: Option<Duration>,
    }

    impl MockHttpClient {
        /// Create a new mock client
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every response by the given duration
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// Register a fixed response for a method and URL
        pub fn mock_response(
            &self,
            method: Method,
            url: impl Into<String>,
            status: u16,
            body: impl Into<String>,
        ) {
            let response = SimpleHttpResponse::new(status, body);
            self.mock_with(method, url, move |_| Ok(response.clone()));
        }

        /// Register a JSON response
        pub fn mock_json<T: serde::Serialize>(
            &self,
            method: Method,
            url: impl Into<String>,
            status: u16,
            data: &T,
        ) -> ClientResult<()> {
            let body = serde_json::to_string(data)?;
            let response = SimpleHttpResponse::new(status, body)
                .with_header("content-type", "application/json");
            self.mock_with(method, url, move |_| Ok(response.clone()));
            Ok(())
        }

        /// Register an error response carrying a `detail` message
        pub fn mock_error(
            &self,
            method: Method,
            url: impl Into<String>,
            status: u16,
            detail: impl Into<String>,
        ) {
            let body = serde_json::json!({ "detail": detail.into() }).to_string();
            self.mock_response(method, url, status, body);
        }

        /// Register a responder that decides per request
        pub fn mock_with<F>(&self, method: Method, url: impl Into<String>, responder: F)
        where
            F: Fn(&HttpRequest) -> ClientResult<SimpleHttpResponse> + Send + Sync + 'static,
        {
            self.routes
                .lock()
                .unwrap()
                .insert((method, url.into()), Arc::new(responder));
        }

        /// Get the list of recorded requests
        pub fn get_requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Count recorded requests for a method and URL
        pub fn count_requests(&self, method: &Method, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| &r.method == method && r.url == url)
                .count()
        }

        fn responder_for(&self, request: &HttpRequest) -> ClientResult<Responder> {
            let routes = self.routes.lock().unwrap();
            let exact = (request.method.clone(), request.url.clone());
            if let Some(responder) = routes.get(&exact) {
                return Ok(responder.clone());
            }

            // Fall back to the route without its query string
            let path_only = request.url.split('?').next().unwrap_or(&request.url);
            routes
                .get(&(request.method.clone(), path_only.to_string()))
                .cloned()
                .ok_or_else(|| {
                    ClientError::Transport(format!(
                        "No mock response configured for {} {}",
                        request.method, request.url
                    ))
                })
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for MockHttpClient {
        async fn send(&self, request: HttpRequest) -> ClientResult<SimpleHttpResponse> {
            self.requests.lock().unwrap().push(request.clone());

            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            let responder = self.responder_for(&request)?;
            responder(&request)
        }
    }
}
