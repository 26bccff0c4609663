//! In-memory [`Store`] fake: a real (if non-durable) implementation of the
//! trait, so tests exercise real control flow instead of mocked stubs.

use crate::error::Result;
use crate::policy::{Policy, PolicyParams};
use crate::store::{ScriptResult, Store, StreamEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default, Clone)]
struct TokenBucketState {
    tokens: f64,
    ts: f64,
}

#[derive(Default, Clone)]
struct LeakyBucketState {
    level: f64,
    ts: f64,
}

#[derive(Default)]
struct Inner {
    gcra: HashMap<String, f64>,
    token_bucket: HashMap<String, TokenBucketState>,
    leaky_bucket: HashMap<String, LeakyBucketState>,
    fixed_window: HashMap<String, i64>,
    streams: HashMap<String, Vec<(String, HashMap<String, String>)>>,
    groups: HashMap<(String, String), u64>,
    hashes: HashMap<String, HashMap<String, String>>,
    next_id: u64,
}

/// An in-memory stand-in for Redis that reimplements the four policies'
/// exact arithmetic directly in Rust, plus a minimal stream/hash store for
/// the analytics worker.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    fn eval_gcra(inner: &mut Inner, key: &str, params: &PolicyParams, now: f64) -> ScriptResult {
        let emission_interval = params.period as f64 / params.requests as f64;
        let delay_variance_limit = emission_interval * params.effective_burst() as f64;

        let tat = inner.gcra.get(key).copied().unwrap_or(now).max(now);
        let new_tat = tat + emission_interval;
        let allow_at = new_tat - delay_variance_limit;

        if now >= allow_at {
            inner.gcra.insert(key.to_string(), new_tat);
            let remaining = ((delay_variance_limit - (new_tat - now)) / emission_interval).floor() as i64;
            ScriptResult { status: 0, retry_after: 0.0, remaining }
        } else {
            ScriptResult { status: 1, retry_after: allow_at - now, remaining: 0 }
        }
    }

    fn eval_token_bucket(inner: &mut Inner, key: &str, params: &PolicyParams, now: f64) -> ScriptResult {
        let refill_rate = params.requests as f64 / params.period as f64;
        let burst = params.effective_burst() as f64;
        let state = inner.token_bucket.get(key).cloned().unwrap_or(TokenBucketState { tokens: burst, ts: now });

        let mut tokens = (state.tokens + (now - state.ts) * refill_rate).min(burst);

        if tokens >= 1.0 {
            tokens -= 1.0;
            inner.token_bucket.insert(key.to_string(), TokenBucketState { tokens, ts: now });
            ScriptResult { status: 0, retry_after: 0.0, remaining: tokens.floor() as i64 }
        } else {
            let retry_after = (1.0 - tokens) / refill_rate;
            inner.token_bucket.insert(key.to_string(), TokenBucketState { tokens, ts: now });
            ScriptResult { status: 1, retry_after, remaining: 0 }
        }
    }

    fn eval_leaky_bucket(inner: &mut Inner, key: &str, params: &PolicyParams, now: f64) -> ScriptResult {
        let leak_rate = params.requests as f64 / params.period as f64;
        let capacity = params.effective_burst() as f64;
        let state = inner.leaky_bucket.get(key).cloned().unwrap_or(LeakyBucketState { level: 0.0, ts: now });

        let mut level = (state.level - (now - state.ts) * leak_rate).max(0.0);

        if level + 1.0 <= capacity {
            level += 1.0;
            inner.leaky_bucket.insert(key.to_string(), LeakyBucketState { level, ts: now });
            ScriptResult { status: 0, retry_after: 0.0, remaining: (capacity - level).floor() as i64 }
        } else {
            let retry_after = (level + 1.0 - capacity) / leak_rate;
            inner.leaky_bucket.insert(key.to_string(), LeakyBucketState { level, ts: now });
            ScriptResult { status: 1, retry_after, remaining: 0 }
        }
    }

    fn eval_fixed_window(inner: &mut Inner, key: &str, params: &PolicyParams, now: f64) -> ScriptResult {
        let window = (now / params.period as f64).floor() as i64;
        let window_key = format!("{key}:{window}");
        let n = inner.fixed_window.entry(window_key).and_modify(|v| *v += 1).or_insert(1);
        let n = *n;

        if n <= params.requests as i64 {
            ScriptResult { status: 0, retry_after: 0.0, remaining: params.requests as i64 - n }
        } else {
            let retry_after = ((window + 1) * params.period as i64) as f64 - now;
            ScriptResult { status: 1, retry_after, remaining: 0 }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn preload_scripts(&self) -> Result<usize> {
        Ok(Policy::ALL.len())
    }

    async fn eval_policy(
        &self,
        policy: Policy,
        key: &str,
        params: &PolicyParams,
        now: f64,
    ) -> Result<ScriptResult> {
        let mut inner = self.lock();
        Ok(match policy {
            Policy::Gcra => Self::eval_gcra(&mut inner, key, params, now),
            Policy::TokenBucket => Self::eval_token_bucket(&mut inner, key, params, now),
            Policy::LeakyBucket => Self::eval_leaky_bucket(&mut inner, key, params, now),
            Policy::FixedWindow => Self::eval_fixed_window(&mut inner, key, params, now),
        })
    }

    async fn xadd_capped(&self, stream: &str, maxlen: u64, fields: &[(&str, &str)]) -> Result<String> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("{}-0", inner.next_id);
        let entry: HashMap<String, String> =
            fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let entries = inner.streams.entry(stream.to_string()).or_default();
        entries.push((id.clone(), entry));
        let maxlen = maxlen as usize;
        if entries.len() > maxlen {
            let overflow = entries.len() - maxlen;
            entries.drain(0..overflow);
        }
        Ok(id)
    }

    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.groups.entry((stream.to_string(), group.to_string())).or_insert(0);
        Ok(())
    }

    async fn xreadgroup(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut inner = self.lock();
        let last_delivered = *inner.groups.get(&(stream.to_string(), group.to_string())).unwrap_or(&0);
        let entries = inner.streams.get(stream).cloned().unwrap_or_default();

        let mut result = Vec::new();
        let mut highest = last_delivered;
        for (idx, (id, fields)) in entries.iter().enumerate() {
            let seq = (idx + 1) as u64;
            if seq > last_delivered && result.len() < count {
                result.push(StreamEntry { id: id.clone(), fields: fields.clone() });
                highest = highest.max(seq);
            }
        }
        inner.groups.insert((stream.to_string(), group.to_string()), highest);
        Ok(result)
    }

    async fn xack(&self, _stream: &str, _group: &str, ids: &[String]) -> Result<u64> {
        Ok(ids.len() as u64)
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut inner = self.lock();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        let current: i64 = hash.get(field).and_then(|v| v.parse().ok()).unwrap_or(0);
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.hashes.entry(key.to_string()).or_default().insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn scan_delete(&self, prefix: &str) -> Result<u64> {
        let mut inner = self.lock();
        let before = inner.hashes.len() + inner.gcra.len() + inner.token_bucket.len() + inner.leaky_bucket.len();
        inner.gcra.retain(|k, _| !k.starts_with(prefix));
        inner.token_bucket.retain(|k, _| !k.starts_with(prefix));
        inner.leaky_bucket.retain(|k, _| !k.starts_with(prefix));
        inner.fixed_window.retain(|k, _| !k.starts_with(prefix));
        inner.hashes.retain(|k, _| !k.starts_with(prefix));
        let after = inner.hashes.len() + inner.gcra.len() + inner.token_bucket.len() + inner.leaky_bucket.len();
        Ok((before - after) as u64)
    }
}
