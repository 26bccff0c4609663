//! The four policy scripts, embedded as Lua source, plus a registry that
//! tracks their store-assigned SHA-1 digests so the hot path can call
//! `EVALSHA` instead of shipping the script body on every request.
//!
//! `KEYS[1]` is always the bucket key; `ARGV` is `[now, period, requests,
//! burst_or_capacity, cost]` (GCRA only uses `cost`, passed as `1` by
//! callers elsewhere). All four return the `(status, retry_after,
//! remaining)` triple described in the policy design. `retry_after` is
//! returned as a Lua string (`tostring`) rather than a bare number, since
//! Redis truncates Lua numbers to integers on the way out over RESP and
//! `retry_after` is meaningfully fractional.

use crate::policy::Policy;
use std::collections::HashMap;
use std::sync::RwLock;

pub const GCRA_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local period = tonumber(ARGV[2])
local requests = tonumber(ARGV[3])
local burst = tonumber(ARGV[4])
local cost = tonumber(ARGV[5])

local emission_interval = period / requests
local delay_variance_limit = emission_interval * burst

local tat = tonumber(redis.call('GET', key))
if tat == nil or tat < now then
  tat = now
end

local new_tat = tat + emission_interval * cost
local allow_at = new_tat - delay_variance_limit

if now >= allow_at then
  redis.call('SET', key, new_tat)
  redis.call('EXPIRE', key, math.ceil(period))
  local remaining = math.floor((delay_variance_limit - (new_tat - now)) / emission_interval)
  return {0, "0", remaining}
else
  return {1, tostring(allow_at - now), 0}
end
"#;

pub const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local period = tonumber(ARGV[2])
local requests = tonumber(ARGV[3])
local burst = tonumber(ARGV[4])

local refill_rate = requests / period
local state = redis.call('HMGET', key, 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil then
  tokens = burst
  ts = now
end

tokens = math.min(burst, tokens + (now - ts) * refill_rate)

if tokens >= 1 then
  tokens = tokens - 1
  redis.call('HSET', key, 'tokens', tokens, 'ts', now)
  redis.call('EXPIRE', key, math.ceil(period))
  return {0, "0", math.floor(tokens)}
else
  -- Persist the refilled-but-not-consumed state so a concurrent caller
  -- observes the same pool rather than replaying a stale timestamp.
  redis.call('HSET', key, 'tokens', tokens, 'ts', now)
  redis.call('EXPIRE', key, math.ceil(period))
  local retry_after = (1 - tokens) / refill_rate
  return {1, tostring(retry_after), 0}
end
"#;

pub const LEAKY_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local period = tonumber(ARGV[2])
local requests = tonumber(ARGV[3])
local capacity = tonumber(ARGV[4])

local leak_rate = requests / period
local state = redis.call('HMGET', key, 'level', 'ts')
local level = tonumber(state[1])
local ts = tonumber(state[2])
if level == nil then
  level = 0
  ts = now
end

level = math.max(0, level - (now - ts) * leak_rate)

if level + 1 <= capacity then
  level = level + 1
  redis.call('HSET', key, 'level', level, 'ts', now)
  redis.call('EXPIRE', key, math.ceil(period))
  return {0, "0", math.floor(capacity - level)}
else
  redis.call('HSET', key, 'level', level, 'ts', now)
  redis.call('EXPIRE', key, math.ceil(period))
  local retry_after = (level + 1 - capacity) / leak_rate
  return {1, tostring(retry_after), 0}
end
"#;

pub const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local period = tonumber(ARGV[2])
local requests = tonumber(ARGV[3])

local window = math.floor(now / period)
local window_key = key .. ':' .. window
local n = redis.call('INCR', window_key)
if n == 1 then
  redis.call('EXPIRE', window_key, period)
end

if n <= requests then
  return {0, "0", requests - n}
else
  local retry_after = (window + 1) * period - now
  return {1, tostring(retry_after), 0}
end
"#;

pub fn script_text(policy: Policy) -> &'static str {
    match policy {
        Policy::Gcra => GCRA_SCRIPT,
        Policy::TokenBucket => TOKEN_BUCKET_SCRIPT,
        Policy::LeakyBucket => LEAKY_BUCKET_SCRIPT,
        Policy::FixedWindow => FIXED_WINDOW_SCRIPT,
    }
}

/// Tracks the store-assigned SHA-1 digest for each policy script so the hot
/// path can `EVALSHA` instead of re-sending the script body.
#[derive(Default)]
pub struct ScriptRegistry {
    digests: RwLock<HashMap<Policy, String>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(&self, policy: Policy) -> Option<String> {
        self.digests.read().expect("script registry lock poisoned").get(&policy).cloned()
    }

    pub fn set_digest(&self, policy: Policy, digest: String) {
        self.digests.write().expect("script registry lock poisoned").insert(policy, digest);
    }

    pub fn loaded_count(&self) -> usize {
        self.digests.read().expect("script registry lock poisoned").len()
    }
}
