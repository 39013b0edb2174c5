use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallback message when the server gives no usable `detail`
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Errors produced by the budget client
///
/// The type is `Clone` so that one refresh failure can be handed to every
/// request that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Input rejected before any request was sent
    #[error("{0}")]
    Validation(String),

    /// The server answered 401 and the request could not be recovered
    #[error("{0}")]
    Unauthorized(String),

    /// Exchanging the refresh token for a new pair failed
    #[error("Failed to refresh authentication token: {reason}")]
    RefreshFailed { reason: String },

    /// A refresh was needed but no refresh token is stored
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Startup check found no stored tokens
    #[error("No tokens found")]
    NoTokens,

    /// Startup check could not renew an expiring session
    #[error("Session expired")]
    SessionExpired,

    /// Operation did not finish within the circuit breaker timeout
    #[error("Request timeout")]
    Timeout,

    /// Circuit breaker is failing fast
    #[error("Circuit breaker '{name}' OPEN. Next attempt in {retry_in_secs}s")]
    CircuitOpen { name: String, retry_in_secs: u64 },

    /// The attempt was aborted by its owner
    #[error("Request aborted")]
    Cancelled,

    /// Non-2xx response from the API
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Connection level failure
    #[error("Network error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Token storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Invalid configuration value for '{key}': {reason}")]
    Config { key: String, reason: String },
}

/// Result alias used throughout the crate
pub type ClientResult<T> = Result<T, ClientError>;

/// Error categories for retry and handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection problems
    Network,
    /// Credentials missing, rejected or expired
    Authentication,
    /// Bad input caught client side
    Validation,
    /// 5xx responses
    Server,
    /// 4xx responses other than 401
    Client,
    /// Deadline exceeded
    Timeout,
    /// Dependency deliberately not called
    ServiceUnavailable,
    /// Aborted by the caller
    Cancelled,
    /// Local failures (storage, config, decoding)
    Internal,
}

impl ErrorCategory {
    /// Whether an error of this category may succeed when tried again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::Timeout
        )
    }
}

impl ClientError {
    /// Build an API error from a response status and body
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = extract_error_message(status, body);
        if status == 401 {
            ClientError::Unauthorized(message)
        } else {
            ClientError::Api { status, message }
        }
    }

    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Validation(_) => ErrorCategory::Validation,
            ClientError::Unauthorized(_)
            | ClientError::RefreshFailed { .. }
            | ClientError::NoRefreshToken
            | ClientError::NoTokens
            | ClientError::SessionExpired => ErrorCategory::Authentication,
            ClientError::Timeout => ErrorCategory::Timeout,
            ClientError::CircuitOpen { .. } => ErrorCategory::ServiceUnavailable,
            ClientError::Cancelled => ErrorCategory::Cancelled,
            ClientError::Api { status, .. } if *status >= 500 => ErrorCategory::Server,
            ClientError::Api { .. } => ErrorCategory::Client,
            ClientError::Transport(_) => ErrorCategory::Network,
            ClientError::Decode(_) | ClientError::Storage(_) | ClientError::Config { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }

    /// Returns true if this error should end the local session
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::RefreshFailed { .. } | ClientError::NoRefreshToken
        )
    }
}

/// Pull a displayable message out of an error response body.
///
/// Uses the server's `detail` when it is a string, a generic message when
/// `detail` has another shape (validation error lists), and a status based
/// message when there is no JSON body at all.
pub fn extract_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(_) => "An error occurred".to_string(),
            None => format!("Request failed with status code {}", status),
        },
        Err(_) if status == 0 => GENERIC_ERROR_MESSAGE.to_string(),
        Err(_) => format!("Request failed with status code {}", status),
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Config {
            key: "api_base_url".to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_message_is_extracted() {
        let err = ClientError::from_response(400, r#"{"detail":"Email already registered"}"#);
        assert_eq!(
            err,
            ClientError::Api {
                status: 400,
                message: "Email already registered".to_string()
            }
        );
        assert_eq!(err.to_string(), "Email already registered");
        assert_eq!(err.category(), ErrorCategory::Client);
    }

    #[test]
    fn test_non_string_detail_uses_generic_message() {
        let body = r#"{"detail":[{"loc":["body","email"],"msg":"field required"}]}"#;
        assert_eq!(extract_error_message(422, body), "An error occurred");
    }

    #[test]
    fn test_missing_body_falls_back_to_status() {
        assert_eq!(
            extract_error_message(502, "<html>Bad Gateway</html>"),
            "Request failed with status code 502"
        );
        assert_eq!(extract_error_message(0, ""), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_unauthorized_response_maps_to_unauthorized() {
        let err = ClientError::from_response(401, r#"{"detail":"Could not validate credentials"}"#);
        assert!(matches!(err, ClientError::Unauthorized(_)));
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.category(), ErrorCategory::Authentication);
    }

    #[test]
    fn test_retryable_categories() {
        assert!(ClientError::Transport("reset".into()).category().is_retryable());
        assert!(ClientError::Timeout.category().is_retryable());
        assert!(ClientError::Api {
            status: 503,
            message: "down".into()
        }
        .category()
        .is_retryable());
        assert!(!ClientError::Validation("bad".into()).category().is_retryable());
        assert!(!ClientError::Cancelled.category().is_retryable());
    }
}
