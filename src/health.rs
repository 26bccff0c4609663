//! `/health` and `/ready` handlers: liveness is a pool ping, readiness adds
//! a script-preload check so a pod isn't marked ready before its `EVALSHA`
//! digests are cached.

use crate::store::Store;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: u64,
    pub version: &'static str,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub async fn health_check(State(store): State<Arc<dyn Store>>) -> impl IntoResponse {
    match store.ping().await {
        Ok(()) => {
            let body = HealthStatus { status: "healthy", timestamp: now_secs(), version: env!("CARGO_PKG_VERSION") };
            (StatusCode::OK, Json(body))
        }
        Err(_) => {
            let body = HealthStatus { status: "degraded", timestamp: now_secs(), version: env!("CARGO_PKG_VERSION") };
            (StatusCode::SERVICE_UNAVAILABLE, Json(body))
        }
    }
}

pub async fn readiness_check(State(store): State<Arc<dyn Store>>) -> impl IntoResponse {
    let ping_ok = store.ping().await.is_ok();
    let scripts_ok = store.preload_scripts().await.is_ok();

    if ping_ok && scripts_ok {
        (StatusCode::OK, Json(serde_json::json!({ "ready": true })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "ready": false })))
    }
}
