//! Pooled Redis client: the production [`Store`](super::Store) implementation.
//!
//! Connections are borrowed from a `bb8` pool sized by `pool_size`, with a
//! borrow timeout of `timeout_ms`. Commands get up to three attempts with
//! fixed backoff (see [`crate::backoff`]) on connection errors; `EVALSHA`
//! additionally reloads and retries once on `NOSCRIPT`.

use crate::backoff;
use crate::error::{FluxError, Result};
use crate::policy::{Policy, PolicyParams};
use crate::scripts::{self, ScriptRegistry};
use crate::store::{ScriptResult, Store, StreamEntry};
use async_trait::async_trait;
use bb8_redis::{bb8, RedisConnectionManager};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

pub struct RedisStore {
    pool: bb8::Pool<RedisConnectionManager>,
    timeout: Duration,
    registry: ScriptRegistry,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, pool_size: u32, timeout_ms: u64) -> Result<Self> {
        let manager = RedisConnectionManager::new(redis_url)
            .map_err(|e| FluxError::Connection(format!("Redis Connection Failed: {e}")))?;

        let pool = bb8::Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_millis(timeout_ms))
            .build(manager)
            .await
            .map_err(|e| FluxError::Connection(format!("Redis Connection Failed: {e}")))?;

        let store = Self { pool, timeout: Duration::from_millis(timeout_ms), registry: ScriptRegistry::new() };
        store.ping().await?;
        Ok(store)
    }

    fn is_retryable(err: &FluxError) -> bool {
        matches!(err, FluxError::Connection(_))
    }

    async fn with_retry<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;
        for attempt in 1..=backoff::MAX_ATTEMPTS {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if Self::is_retryable(&err) => {
                    tracing::warn!("Attempt {}/{} failed: {}", attempt, backoff::MAX_ATTEMPTS, err);
                    last_err = Some(err);
                    if attempt < backoff::MAX_ATTEMPTS {
                        tokio::time::sleep(backoff::delay_for(attempt)).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }

    async fn ensure_digest(&self, policy: Policy) -> Result<String> {
        if let Some(digest) = self.registry.digest(policy) {
            return Ok(digest);
        }
        let mut conn = self.pool.get().await?;
        let digest: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(scripts::script_text(policy))
            .query_async(&mut *conn)
            .await?;
        self.registry.set_digest(policy, digest.clone());
        Ok(digest)
    }

    async fn try_evalsha(
        &self,
        policy: Policy,
        digest: &str,
        key: &str,
        params: &PolicyParams,
        now: f64,
    ) -> Result<ScriptResult> {
        let mut conn = self.pool.get().await?;
        let burst_or_capacity = params.effective_burst();
        let result: std::result::Result<(i64, String, i64), redis::RedisError> = redis::cmd("EVALSHA")
            .arg(digest)
            .arg(1)
            .arg(key)
            .arg(now)
            .arg(params.period)
            .arg(params.requests)
            .arg(burst_or_capacity)
            .arg(1) // cost, consulted only by GCRA
            .query_async(&mut *conn)
            .await;

        match result {
            Ok((status, retry_after, remaining)) => Ok(ScriptResult {
                status,
                retry_after: retry_after.parse().unwrap_or(0.0),
                remaining,
            }),
            Err(e) if e.to_string().contains("NOSCRIPT") => {
                drop(conn);
                let mut conn = self.pool.get().await?;
                let fresh_digest: String = redis::cmd("SCRIPT")
                    .arg("LOAD")
                    .arg(scripts::script_text(policy))
                    .query_async(&mut *conn)
                    .await?;
                self.registry.set_digest(policy, fresh_digest.clone());
                let (status, retry_after, remaining): (i64, String, i64) = redis::cmd("EVALSHA")
                    .arg(&fresh_digest)
                    .arg(1)
                    .arg(key)
                    .arg(now)
                    .arg(params.period)
                    .arg(params.requests)
                    .arg(burst_or_capacity)
                    .arg(1)
                    .query_async(&mut *conn)
                    .await?;
                Ok(ScriptResult { status, retry_after: retry_after.parse().unwrap_or(0.0), remaining })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn ping(&self) -> Result<()> {
        self.with_retry(|| async {
            let mut conn = self.pool.get().await?;
            let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
            Ok(())
        })
        .await
    }

    async fn preload_scripts(&self) -> Result<usize> {
        let mut loaded = 0;
        for policy in Policy::ALL {
            if self.registry.digest(policy).is_none() {
                self.ensure_digest(policy).await?;
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    async fn eval_policy(
        &self,
        policy: Policy,
        key: &str,
        params: &PolicyParams,
        now: f64,
    ) -> Result<ScriptResult> {
        let digest = self.ensure_digest(policy).await?;
        self.with_retry(|| self.try_evalsha(policy, &digest, key, params, now)).await
    }

    async fn xadd_capped(&self, stream: &str, maxlen: u64, fields: &[(&str, &str)]) -> Result<String> {
        self.with_retry(|| async {
            let mut conn = self.pool.get().await?;
            let mut cmd = redis::cmd("XADD");
            cmd.arg(stream).arg("MAXLEN").arg("~").arg(maxlen).arg("*");
            for (field, value) in fields {
                cmd.arg(*field).arg(*value);
            }
            let id: String = cmd.query_async(&mut *conn).await?;
            Ok(id)
        })
        .await
    }

    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let result: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut *conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn xreadgroup(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut conn = self.pool.get().await?;
        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut *conn)
            .await?;

        let mut entries = Vec::new();
        for stream_key in reply.keys {
            for id_entry in stream_key.ids {
                let mut fields = HashMap::new();
                for (field, value) in id_entry.map {
                    if let redis::Value::Data(bytes) = value {
                        fields.insert(field, String::from_utf8_lossy(&bytes).into_owned());
                    }
                }
                entries.push(StreamEntry { id: id_entry.id, fields });
            }
        }
        Ok(entries)
    }

    async fn xack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64> {
        let mut conn = self.pool.get().await?;
        let count: u64 = conn.xack(stream, group, ids).await?;
        Ok(count)
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let value: i64 = conn.hincr(key, field, delta).await?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.pool.get().await?;
        let map: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(map)
    }

    async fn scan_delete(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.pool.get().await?;
        let mut cursor: u64 = 0;
        let mut removed = 0u64;
        let pattern = format!("{prefix}*");
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut *conn)
                .await?;
            if !keys.is_empty() {
                let deleted: u64 = conn.del(&keys).await?;
                removed += deleted;
            }
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(removed)
    }
}

impl RedisStore {
    /// Reports, for each policy, whether its script digest is currently
    /// cached in the store. Inherent rather than part of [`Store`] — only
    /// the `inspect` CLI command needs it.
    pub async fn script_status(&self) -> Result<Vec<(Policy, bool)>> {
        let mut conn = self.pool.get().await?;
        let mut statuses = Vec::with_capacity(Policy::ALL.len());
        for policy in Policy::ALL {
            let digest = self.ensure_digest(policy).await?;
            let exists: Vec<bool> =
                redis::cmd("SCRIPT").arg("EXISTS").arg(&digest).query_async(&mut *conn).await?;
            statuses.push((policy, exists.first().copied().unwrap_or(false)));
        }
        Ok(statuses)
    }

    /// Lists live keys under `prefix` with their TTL via a blocking `KEYS`
    /// scan. Diagnostic-only — never called from the request hot path.
    pub async fn keys_with_ttl(&self, prefix: &str) -> Result<Vec<(String, i64)>> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = redis::cmd("KEYS").arg(&pattern).query_async(&mut *conn).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut *conn).await?;
            out.push((key, ttl));
        }
        Ok(out)
    }
}
