//! End-to-end tests driving the `flux` crate through its public surface:
//! HTTP routes over `MemoryStore` for the fast path, plus a handful of
//! `#[ignore]`-gated tests against a live Redis instance (set `REDIS_URL` to
//! run them, e.g. `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use flux::config::FluxConfig;
use flux::policy::{Policy, PolicyParams};
use flux::server::create_app;
use flux::store::{MemoryStore, RedisStore, Store};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn config_with(params: PolicyParams) -> FluxConfig {
    let mut config = FluxConfig::default();
    config.rate_limit = params;
    config
}

#[tokio::test]
async fn health_and_ready_report_ok_against_memory_store() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let app = create_app(store, Arc::new(FluxConfig::default()), "test");

    for path in ["/health", "/ready"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path} did not return 200");
    }
}

#[tokio::test]
async fn rate_limited_route_denies_after_quota_and_stamps_headers() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let config = config_with(PolicyParams::new(Policy::FixedWindow, 2, 60));
    let app = create_app(store, Arc::new(config), "checkout");

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/limited")
                    .header("x-api-key", "shopper-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);
}

#[tokio::test]
async fn distinct_api_keys_are_isolated() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let config = config_with(PolicyParams::new(Policy::TokenBucket, 1, 60));
    let app = create_app(store, Arc::new(config), "checkout");

    for caller in ["shopper-a", "shopper-b"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/limited")
                    .header("x-api-key", caller)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{caller} should not be blocked by another caller");
    }
}

#[tokio::test]
async fn recovery_after_retry_after_window_allows_again() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let config = config_with(PolicyParams::new(Policy::FixedWindow, 1, 1));
    let app = create_app(store, Arc::new(config), "recover");

    let first = app
        .clone()
        .oneshot(
            Request::builder().uri("/limited").header("x-api-key", "r1").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(
            Request::builder().uri("/limited").header("x-api-key", "r1").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let third = app
        .oneshot(
            Request::builder().uri("/limited").header("x-api-key", "r1").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn live_redis_pool_survives_concurrent_pings() {
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for live Redis tests");
    let store = Arc::new(RedisStore::connect(&redis_url, 5, 1000).await.unwrap());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                store.ping().await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
#[ignore]
async fn live_redis_evalsha_survives_manual_script_flush() {
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for live Redis tests");
    let store = RedisStore::connect(&redis_url, 5, 1000).await.unwrap();
    let params = PolicyParams::new(Policy::Gcra, 5, 60);

    store.eval_policy(Policy::Gcra, "flux-test:noscript", &params, 0.0).await.unwrap();

    // Flush the store's script cache out from under the client; the next
    // eval must reload the digest and retry transparently.
    let mut flush_conn =
        redis::Client::open(redis_url).unwrap().get_multiplexed_async_connection().await.unwrap();
    let _: () = redis::cmd("SCRIPT").arg("FLUSH").query_async(&mut flush_conn).await.unwrap();

    let result = store.eval_policy(Policy::Gcra, "flux-test:noscript", &params, 1.0).await.unwrap();
    assert!(result.allowed());
}

#[tokio::test]
#[ignore]
async fn live_redis_gcra_allows_burst_then_denies() {
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for live Redis tests");
    let store = RedisStore::connect(&redis_url, 5, 1000).await.unwrap();
    let params = PolicyParams::new(Policy::Gcra, 5, 60);
    store.scan_delete("flux-test:gcra:").await.unwrap();

    let mut decisions = Vec::new();
    for t in 0..7 {
        let result =
            store.eval_policy(Policy::Gcra, "flux-test:gcra:u1", &params, t as f64 / 1000.0).await.unwrap();
        decisions.push(result.allowed());
    }
    assert_eq!(decisions, vec![true, true, true, true, true, false, false]);
}

#[tokio::test]
#[ignore]
async fn live_redis_token_bucket_quota_then_denial() {
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for live Redis tests");
    let store = RedisStore::connect(&redis_url, 5, 1000).await.unwrap();
    let params = PolicyParams::new(Policy::TokenBucket, 5, 60);
    store.scan_delete("flux-test:tb:").await.unwrap();

    for _ in 0..5 {
        let result = store.eval_policy(Policy::TokenBucket, "flux-test:tb:k", &params, 0.0).await.unwrap();
        assert!(result.allowed());
    }
    let sixth = store.eval_policy(Policy::TokenBucket, "flux-test:tb:k", &params, 0.0).await.unwrap();
    assert!(!sixth.allowed());
}

#[tokio::test]
#[ignore]
async fn live_redis_leaky_bucket_quota_then_denial() {
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for live Redis tests");
    let store = RedisStore::connect(&redis_url, 5, 1000).await.unwrap();
    let params = PolicyParams::new(Policy::LeakyBucket, 5, 60);
    store.scan_delete("flux-test:lb:").await.unwrap();

    for _ in 0..5 {
        let result = store.eval_policy(Policy::LeakyBucket, "flux-test:lb:k", &params, 0.0).await.unwrap();
        assert!(result.allowed());
    }
    let sixth = store.eval_policy(Policy::LeakyBucket, "flux-test:lb:k", &params, 0.0).await.unwrap();
    assert!(!sixth.allowed());
}

#[tokio::test]
#[ignore]
async fn live_redis_fixed_window_quota_then_denial() {
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for live Redis tests");
    let store = RedisStore::connect(&redis_url, 5, 1000).await.unwrap();
    let params = PolicyParams::new(Policy::FixedWindow, 5, 60);
    store.scan_delete("flux-test:fw:").await.unwrap();

    for _ in 0..5 {
        let result = store.eval_policy(Policy::FixedWindow, "flux-test:fw:k", &params, 0.0).await.unwrap();
        assert!(result.allowed());
    }
    let sixth = store.eval_policy(Policy::FixedWindow, "flux-test:fw:k", &params, 0.0).await.unwrap();
    assert!(!sixth.allowed());
}

#[tokio::test]
#[ignore]
async fn live_redis_analytics_stream_roundtrips() {
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for live Redis tests");
    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&redis_url, 5, 1000).await.unwrap());
    let stream = "flux-test:analytics".to_string();

    for d in ["1", "0"] {
        store.xadd_capped(&stream, 1000, &[("ep", "live"), ("d", d), ("ts", "0"), ("key", "k")]).await.unwrap();
    }

    let worker = flux::analytics::AnalyticsWorker::new(store.clone(), stream, "flux-test:".to_string());
    let processed = worker.process_batch().await.unwrap();
    assert_eq!(processed, 2);

    let per_ep = store.hgetall("flux-test:stats:ep:live").await.unwrap();
    assert_eq!(per_ep.get("c:allowed"), Some(&"1".to_string()));
    assert_eq!(per_ep.get("c:blocked"), Some(&"1".to_string()));
}
