//! HTTP middleware: request logging (kept from the original), CORS (kept),
//! and rate limiting (previously a pass-through placeholder, now wired to
//! [`crate::limiter::Limiter`]).

use crate::adapters::{self, KeyExtractor};
use crate::error::RateLimitExceeded;
use crate::limiter::Limiter;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Logging middleware that tracks request duration and basic metrics.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_success() {
        info!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request completed"
        );
    } else {
        warn!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request completed with error"
        );
    }

    response
}

/// CORS middleware for API access.
pub async fn cors_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", "*".parse().unwrap());
    headers.insert("access-control-allow-methods", "GET, POST, PUT, DELETE, OPTIONS".parse().unwrap());
    headers.insert("access-control-allow-headers", "content-type, authorization".parse().unwrap());

    response
}

/// Shared state for [`rate_limit_middleware`]: the façade plus the ordered
/// list of key extractors tried against each request.
pub struct RateLimitContext {
    pub limiter: Limiter,
    pub extractors: Vec<Box<dyn KeyExtractor>>,
    pub endpoint: String,
}

/// Runs the configured key extractors, calls [`Limiter::hit`], and either
/// forwards the request (stamping `X-RateLimit-*` headers) or short-circuits
/// with `429 Too Many Requests`.
pub async fn rate_limit_middleware(
    State(ctx): State<Arc<RateLimitContext>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let key = adapters::extract_first(&ctx.extractors, &parts).unwrap_or_else(|| "anonymous".to_string());
    let request = Request::from_parts(parts, body);

    match ctx.limiter.hit(&key, &ctx.endpoint).await {
        Ok(result) if result.allowed => {
            let mut response = next.run(request).await;
            for (name, value) in result.to_headers(0) {
                if let Ok(header_value) = value.parse() {
                    response.headers_mut().insert(name, header_value);
                }
            }
            response
        }
        Ok(result) => {
            let exceeded = RateLimitExceeded::new(key, result.retry_after);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate limit exceeded",
                    "retry_after": result.retry_after,
                })),
            )
                .into_response();
            for (name, value) in exceeded.to_headers() {
                if let Ok(header_value) = value.parse() {
                    response.headers_mut().insert(name, header_value);
                }
            }
            response
        }
        Err(err) => err.into_response(),
    }
}
