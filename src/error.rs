//! # Error Types and Handling
//!
//! Defines the crate's error currency, [`FluxError`], and the
//! [`RateLimitExceeded`] decision type raised at the middleware boundary.
//!
//! ## Error to HTTP Status Mapping
//!
//! | `FluxError` variant | HTTP status          |
//! |----------------------|-----------------------|
//! | `PoolExhausted`      | 503 Service Unavailable |
//! | `Connection`         | 503 Service Unavailable |
//! | `Command`            | 502 Bad Gateway       |
//! | `Script`             | 500 Internal Server Error |
//! | `Config`             | 500 Internal Server Error |
//! | `Serialization`      | 500 Internal Server Error |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;

/// Unified error type for the store client, script registry, limiter, and
/// analytics worker.
#[derive(Debug, thiserror::Error)]
pub enum FluxError {
    /// Transport or reachability failure. Messages for initial connect
    /// failures always begin with the literal `"Redis Connection Failed"`.
    #[error("{0}")]
    Connection(String),

    /// No pooled connection became available before `timeout_ms` elapsed.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The store returned a well-formed error reply (wrong type, syntax).
    #[error("command error: {0}")]
    Command(String),

    /// The store rejected a script semantically (e.g. invalid argument).
    #[error("script error: {0}")]
    Script(String),

    /// Configuration is invalid (bad policy name, non-positive period, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON encode/decode failure (bucket state, analytics events).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for FluxError {
    fn from(err: redis::RedisError) -> Self {
        use redis::ErrorKind;
        match err.kind() {
            ErrorKind::IoError => FluxError::Connection(format!("Redis Connection Failed: {err}")),
            _ if err.is_connection_refusal() || err.is_connection_dropped() => {
                FluxError::Connection(format!("Redis Connection Failed: {err}"))
            }
            _ => FluxError::Command(err.to_string()),
        }
    }
}

impl From<bb8::RunError<redis::RedisError>> for FluxError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::User(e) => e.into(),
            bb8::RunError::TimedOut => FluxError::PoolExhausted,
        }
    }
}

impl IntoResponse for FluxError {
    fn into_response(self) -> Response {
        let status = match &self {
            FluxError::PoolExhausted | FluxError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            FluxError::Command(_) => StatusCode::BAD_GATEWAY,
            FluxError::Script(_) | FluxError::Config(_) | FluxError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FluxError>;

/// Raised by the middleware boundary when a decision is denied. Not an
/// internal fault — a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitExceeded {
    pub key: String,
    pub retry_after: f64,
}

impl RateLimitExceeded {
    pub fn new(key: impl Into<String>, retry_after: f64) -> Self {
        Self { key: key.into(), retry_after }
    }

    /// Header view used by middleware when short-circuiting a request.
    pub fn to_headers(&self) -> HashMap<&'static str, String> {
        let mut headers = HashMap::new();
        headers.insert("Retry-After", self.retry_after.ceil().to_string());
        headers.insert("X-RateLimit-Remaining", "0".to_string());
        headers
    }
}

impl std::fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate limit exceeded for '{}', retry after {}s", self.key, self.retry_after)
    }
}

impl std::error::Error for RateLimitExceeded {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_headers_matches_fixture() {
        let exceeded = RateLimitExceeded::new("test", 10.0);
        let headers = exceeded.to_headers();
        assert_eq!(headers.get("Retry-After"), Some(&"10".to_string()));
        assert_eq!(headers.get("X-RateLimit-Remaining"), Some(&"0".to_string()));
    }

    #[test]
    fn connection_error_message_contains_expected_literal() {
        let err = FluxError::Connection("Redis Connection Failed: refused".to_string());
        assert!(err.to_string().contains("Redis Connection Failed"));
    }
}
