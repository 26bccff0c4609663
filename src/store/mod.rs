//! The `Store` trait is the seam between the limiter/analytics logic and
//! whatever actually holds state — a pooled Redis connection in production,
//! an in-memory fake in tests. This replaces attribute-mocking of a client
//! object with an explicit trait object.

pub mod memory_store;
pub mod redis_store;

use crate::error::Result;
use crate::policy::{Policy, PolicyParams};
use async_trait::async_trait;
use std::collections::HashMap;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

/// Outcome of one policy evaluation: `status` is 0 (allowed) or 1 (denied);
/// `retry_after` is seconds until the next allowed hit; `remaining` is
/// advisory remaining capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptResult {
    pub status: i64,
    pub retry_after: f64,
    pub remaining: i64,
}

impl ScriptResult {
    pub fn allowed(&self) -> bool {
        self.status == 0
    }
}

/// One entry read from a consumer-group stream read.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Connectivity probe. `Err` maps to `FluxError::Connection`.
    async fn ping(&self) -> Result<()>;

    /// Ensures all four policy scripts are cached in the store, returning
    /// the count loaded (not the count already present).
    async fn preload_scripts(&self) -> Result<usize>;

    /// Runs one policy evaluation against `key` at time `now` (seconds,
    /// floating point, supplied by the caller so the store's local clock is
    /// never consulted).
    async fn eval_policy(
        &self,
        policy: Policy,
        key: &str,
        params: &PolicyParams,
        now: f64,
    ) -> Result<ScriptResult>;

    /// Appends an event to `stream`, trimming to an approximate `maxlen`.
    async fn xadd_capped(&self, stream: &str, maxlen: u64, fields: &[(&str, &str)]) -> Result<String>;

    /// Idempotently creates `group` on `stream`, starting from `0`.
    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()>;

    async fn xreadgroup(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>>;

    async fn xack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64>;

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Deletes every key matching `prefix*`, returning the count removed.
    /// Uses a non-blocking cursor scan, never `KEYS`, on the runtime path.
    async fn scan_delete(&self, prefix: &str) -> Result<u64>;
}
