//! HTTP server: wires the health/readiness probes and the rate-limit
//! middleware into an `axum` router, built on Tokio.
//!
//! ## Routes
//!
//! - `GET /health` — liveness (pool ping)
//! - `GET /ready`  — readiness (pool ping + script preload)
//! - `GET /limited` — an example protected route behind
//!   [`rate_limit_middleware`], demonstrating the middleware wired up end
//!   to end
//!
//! ## Graceful shutdown
//!
//! `SIGINT` and (on Unix) `SIGTERM` both trigger a graceful shutdown: axum
//! stops accepting new connections and waits for in-flight requests to
//! finish.

use crate::adapters::{HeaderKeyExtractor, KeyExtractor};
use crate::config::FluxConfig;
use crate::health::{health_check, readiness_check};
use crate::limiter::Limiter;
use crate::middleware::{rate_limit_middleware, RateLimitContext};
use crate::store::Store;
use axum::extract::FromRef;
use axum::routing::get;
use axum::{middleware, Json, Router};
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Combined router state. `axum::State<T>` extractors resolve `T` via
/// [`FromRef`], so handlers can ask for just the piece they need instead of
/// the whole bundle.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn Store>,
    rate_limit_ctx: Arc<RateLimitContext>,
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Arc<RateLimitContext> {
    fn from_ref(state: &AppState) -> Self {
        state.rate_limit_ctx.clone()
    }
}

async fn limited_ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Builds the application router. `endpoint` labels the analytics events
/// emitted by requests passing through the rate-limit middleware.
pub fn create_app(store: Arc<dyn Store>, config: Arc<FluxConfig>, endpoint: &str) -> Router {
    let limiter = Limiter::from_config(store.clone(), config.clone(), endpoint);
    let extractors: Vec<Box<dyn KeyExtractor>> = vec![Box::new(HeaderKeyExtractor::new("x-api-key"))];
    let rate_limit_ctx =
        Arc::new(RateLimitContext { limiter, extractors, endpoint: endpoint.to_string() });

    let state = AppState { store, rate_limit_ctx };

    let limited = Router::new()
        .route("/limited", get(limited_ok))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .merge(limited)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Owns the bound router and its listen address.
pub struct Server {
    app: Router,
    bind_address: String,
}

impl Server {
    pub fn new(store: Arc<dyn Store>, config: Arc<FluxConfig>) -> Self {
        let bind_address = config.server.bind_address.clone();
        let app = create_app(store, config, "default");
        Self { app, bind_address }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        tracing::info!("flux server starting on {}", self.bind_address);
        tracing::info!("health check available at /health");
        tracing::info!("readiness check available at /ready");

        axum::serve(listener, self.app).with_graceful_shutdown(shutdown_signal()).await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received terminate signal, initiating graceful shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_route_returns_ok() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let app = create_app(store, Arc::new(FluxConfig::default()), "test");
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn limited_route_allows_then_denies() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut config = FluxConfig::default();
        config.rate_limit = crate::policy::PolicyParams::new(crate::policy::Policy::FixedWindow, 1, 60);
        let app = create_app(store, Arc::new(config), "test");

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/limited")
                    .header("x-api-key", "caller-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(
                Request::builder()
                    .uri("/limited")
                    .header("x-api-key", "caller-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
