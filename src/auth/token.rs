//! Unverified inspection of JWT access tokens.
//!
//! The client never validates signatures; it only reads the payload to decide
//! whether a token is about to expire so it can refresh ahead of time.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Refresh this many seconds before the token actually expires
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 300;

/// base64url that accepts payloads with or without padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims read from an access token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedToken {
    /// Expiry, unix seconds
    pub exp: i64,
    /// Issued at, unix seconds
    #[serde(default)]
    pub iat: i64,
    /// Subject user id
    #[serde(default)]
    pub user_id: String,
    /// Subject email
    #[serde(default)]
    pub email: String,
}

/// An access/refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Authentication events for whoever drives the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Credentials are gone; the user must log in again
    LoginRequired { reason: String },
    /// A new token pair was stored after a refresh
    TokensRefreshed,
    /// The session was ended locally
    LoggedOut,
}

/// Decode a token payload without verifying it
pub fn decode(token: &str) -> Option<DecodedToken> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        debug!(segments = parts.len(), "Token does not have three segments");
        return None;
    }

    let bytes = match URL_SAFE_LENIENT.decode(parts[1]) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Token payload is not valid base64url");
            return None;
        }
    };

    match serde_json::from_slice::<DecodedToken>(&bytes) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!(error = %e, "Failed to decode token payload");
            None
        }
    }
}

/// Check whether a token is expired or will expire within `buffer_secs`
pub fn is_expired(token: &str, buffer_secs: i64) -> bool {
    is_expired_at(token, buffer_secs, Utc::now())
}

/// Same as [`is_expired`] against an explicit clock reading
pub fn is_expired_at(token: &str, buffer_secs: i64, now: DateTime<Utc>) -> bool {
    match decode(token) {
        Some(decoded) => {
            decoded.exp.saturating_mul(1000)
                < now.timestamp_millis().saturating_add(buffer_secs.saturating_mul(1000))
        }
        None => true,
    }
}

/// When the token expires
pub fn expiration(token: &str) -> Option<DateTime<Utc>> {
    decode(token).and_then(|decoded| DateTime::from_timestamp(decoded.exp, 0))
}

/// User id claim, if present and non-empty
pub fn user_id(token: &str) -> Option<String> {
    decode(token)
        .map(|decoded| decoded.user_id)
        .filter(|id| !id.is_empty())
}

/// Email claim, if present and non-empty
pub fn email(token: &str) -> Option<String> {
    decode(token)
        .map(|decoded| decoded.email)
        .filter(|email| !email.is_empty())
}

/// Build an unsigned token around a JSON payload
///
/// Only meant for tests and local tooling; the signature segment is fixed.
pub fn encode_unsigned(payload: &serde_json::Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn token_expiring_at(exp: i64) -> String {
        encode_unsigned(&json!({
            "exp": exp,
            "iat": exp - 1800,
            "user_id": "u-42",
            "email": "ada@example.com"
        }))
    }

    #[test]
    fn test_decode_round_trips_claims() {
        let token = token_expiring_at(1_700_000_000);
        let decoded = decode(&token).expect("token should decode");
        assert_eq!(
            decoded,
            DecodedToken {
                exp: 1_700_000_000,
                iat: 1_699_998_200,
                user_id: "u-42".to_string(),
                email: "ada@example.com".to_string(),
            }
        );
        assert_eq!(user_id(&token).as_deref(), Some("u-42"));
        assert_eq!(email(&token).as_deref(), Some("ada@example.com"));
        assert_eq!(
            expiration(&token),
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        use base64::engine::general_purpose::URL_SAFE;
        let payload = URL_SAFE.encode(json!({"exp": 10}).to_string());
        let token = format!("h.{}.s", payload);
        assert_eq!(decode(&token).map(|d| d.exp), Some(10));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(decode("").is_none());
        assert!(decode("only.two").is_none());
        assert!(decode("a.b.c.d").is_none());
        assert!(decode("header.!!!.sig").is_none());

        let not_json = URL_SAFE_LENIENT.encode("not json");
        assert!(decode(&format!("h.{}.s", not_json)).is_none());

        let no_exp = URL_SAFE_LENIENT.encode(json!({"user_id": "x"}).to_string());
        assert!(decode(&format!("h.{}.s", no_exp)).is_none());
    }

    #[test]
    fn test_is_expired_respects_buffer() {
        let now = Utc::now();
        let buffer = DEFAULT_EXPIRY_BUFFER_SECS;

        // Well outside the buffer
        let fresh = token_expiring_at((now + Duration::hours(1)).timestamp());
        assert!(!is_expired_at(&fresh, buffer, now));

        // Inside the five minute window
        let closing = token_expiring_at((now + Duration::minutes(4)).timestamp());
        assert!(is_expired_at(&closing, buffer, now));
        assert!(!is_expired_at(&closing, 0, now));

        // Already gone
        let stale = token_expiring_at((now - Duration::minutes(1)).timestamp());
        assert!(is_expired_at(&stale, buffer, now));
    }

    #[test]
    fn test_is_expired_boundary_over_sampled_clocks() {
        let exp = 2_000_000_000i64;
        let token = token_expiring_at(exp);
        for offset_ms in [-600_000i64, -300_001, -300_000, -299_999, 0, 1, 600_000] {
            let now_ms = exp * 1000 - 300_000 + offset_ms;
            let now = DateTime::from_timestamp_millis(now_ms).unwrap();
            let expected = exp * 1000 < now_ms + 300_000;
            assert_eq!(is_expired_at(&token, 300, now), expected, "now_ms={now_ms}");
        }
    }

    #[test]
    fn test_undecodable_token_counts_as_expired() {
        assert!(is_expired("garbage", DEFAULT_EXPIRY_BUFFER_SECS));
    }
}
