//! The limiter façade: composes the store, fingerprint hashing, jitter, and
//! analytics emission into the public `hit`/`check`/`is_allowed` surface.

use crate::config::FluxConfig;
use crate::error::Result;
use crate::hashing;
use crate::jitter;
use crate::policy::PolicyParams;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The outcome of one `hit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitResult {
    pub allowed: bool,
    pub remaining: i64,
    pub retry_after: f64,
    pub limit: u32,
}

impl LimitResult {
    /// `X-RateLimit-*` / `Retry-After` headers for the HTTP response.
    pub fn to_headers(&self, reset_in: u64) -> HashMap<&'static str, String> {
        let mut headers = HashMap::new();
        headers.insert("X-RateLimit-Limit", self.limit.to_string());
        headers.insert("X-RateLimit-Remaining", self.remaining.to_string());
        headers.insert("X-RateLimit-Reset", reset_in.to_string());
        if !self.allowed {
            headers.insert("Retry-After", self.retry_after.ceil().to_string());
        }
        headers
    }
}

pub struct Limiter {
    store: Arc<dyn Store>,
    config: Arc<FluxConfig>,
    params: PolicyParams,
}

impl Limiter {
    pub fn new(store: Arc<dyn Store>, config: Arc<FluxConfig>, params: PolicyParams) -> Self {
        Self { store, config, params }
    }

    /// Builds a limiter from a named preset in `config.rate_limits`,
    /// falling back to `config.rate_limit` when the name is absent.
    pub fn from_config(store: Arc<dyn Store>, config: Arc<FluxConfig>, name: &str) -> Self {
        let params = config.params_for(name);
        Self::new(store, config, params)
    }

    fn now_secs() -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs_f64()
    }

    /// Evaluates one request for `fingerprint` against `endpoint` (used
    /// only for analytics labeling; pass `""` when there's no meaningful
    /// endpoint dimension).
    pub async fn hit(&self, fingerprint: &str, endpoint: &str) -> Result<LimitResult> {
        let key = hashing::store_key(&self.config.flux.key_prefix, fingerprint);
        let now = Self::now_secs();

        let eval = self.store.eval_policy(self.params.policy, &key, &self.params, now).await;

        let result = match eval {
            Ok(script_result) => {
                let retry_after = jitter::apply(
                    script_result.retry_after,
                    self.config.flux.jitter_enabled,
                    self.config.flux.jitter_max_ms,
                );
                LimitResult {
                    allowed: script_result.allowed(),
                    remaining: script_result.remaining,
                    retry_after,
                    limit: self.params.requests,
                }
            }
            Err(err) if self.config.flux.fail_silently => {
                tracing::warn!("fail_silently engaged after store error: {err}");
                LimitResult { allowed: true, remaining: self.params.requests as i64, retry_after: 0.0, limit: self.params.requests }
            }
            Err(err) => return Err(err),
        };

        tracing::debug!(
            key = %key,
            remaining = result.remaining,
            retry_after = result.retry_after,
            allowed = result.allowed,
            "rate limit decision"
        );

        if self.config.flux.analytics_enabled {
            self.emit_analytics(&key, endpoint, &result).await;
        }

        Ok(result)
    }

    /// Synonym for [`Self::hit`] with no endpoint label.
    pub async fn check(&self, fingerprint: &str) -> Result<LimitResult> {
        self.hit(fingerprint, "").await
    }

    pub async fn is_allowed(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.hit(fingerprint, "").await?.allowed)
    }

    async fn emit_analytics(&self, key: &str, endpoint: &str, result: &LimitResult) {
        let ts = (Self::now_secs() * 1000.0) as u64;
        let decision = if result.allowed { "1" } else { "0" };
        let remaining = result.remaining.to_string();
        let retry_after = result.retry_after.to_string();
        let policy = self.params.policy.as_str();
        let ts_str = ts.to_string();

        let fields: [(&str, &str); 7] = [
            ("ts", &ts_str),
            ("key", key),
            ("ep", endpoint),
            ("p", policy),
            ("d", decision),
            ("r", &remaining),
            ("a", &retry_after),
        ];

        if let Err(err) = self
            .store
            .xadd_capped(&self.config.flux.analytics_stream, self.config.flux.analytics_max_len, &fields)
            .await
        {
            tracing::warn!("analytics emission failed (best-effort): {err}");
        }
    }
}
