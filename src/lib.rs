//! # Flux - A Distributed Rate Limiting Engine
//!
//! Flux is a Redis-backed rate limiting engine. Every policy decision runs
//! as an atomic Lua script inside Redis, so concurrent callers on the same
//! key never race against each other even when spread across many
//! application instances.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────────┐     ┌─────────────┐
//! │   Caller    │────▶│      Limiter Façade       │────▶│    Redis    │
//! │             │     │  (hash key, apply jitter)  │     │  (scripts,  │
//! └─────────────┘     └──────────────────────────┘     │   buckets)  │
//!                                  │                     └─────────────┘
//!                     ┌────────────┴────────────┐
//!                     ▼                          ▼
//!              ┌─────────────┐           ┌───────────────┐
//!              │ Script      │           │ Analytics     │
//!              │ Registry    │           │ Worker        │
//!              │ (EVALSHA)   │           │ (consumer grp)│
//!              └─────────────┘           └───────────────┘
//! ```
//!
//! ## Core Components
//!
//! - **[`Limiter`](limiter::Limiter)** - the public façade: hash, evaluate, jitter, emit
//! - **[`store::Store`]** - the seam between policy logic and the backing store
//! - **[`policy::Policy`]** - GCRA, token bucket, leaky bucket, fixed window
//! - **[`analytics::AnalyticsWorker`]** - folds the raw event stream into aggregate counters
//! - **[`server::Server`]** - HTTP surface (health/readiness probes, rate-limit middleware)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flux::config::FluxConfig;
//! use flux::store::RedisStore;
//! use flux::server::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FluxConfig::load(None)?;
//!     let store = Arc::new(
//!         RedisStore::connect(&config.redis_url(), config.redis.pool_size, config.redis.timeout_ms).await?,
//!     );
//!     let server = Server::new(store, Arc::new(config));
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request Flow
//!
//! 1. A caller's fingerprint is SHA-256 hashed and prefixed into a store key.
//! 2. [`Limiter::hit`](limiter::Limiter::hit) evaluates the configured policy script atomically in Redis.
//! 3. On denial, optional jitter spreads out the returned `retry_after`.
//! 4. The HTTP middleware stamps `X-RateLimit-*`/`Retry-After` headers or returns 429.
//! 5. If analytics is enabled, the decision is appended to a capped stream for later aggregation.
//!
//! ## Module Organization
//!
//! - [`adapters`] - request key extraction strategies
//! - [`analytics`] - consumer-group stream reader, folds events into hash counters
//! - [`backoff`] - fixed retry delay table for the store client
//! - [`cli`] - `init`/`clear`/`inspect` operator subcommands
//! - [`config`] - layered TOML + environment configuration
//! - [`error`] - typed error hierarchy with HTTP status mapping
//! - [`hashing`] - fingerprint-to-store-key hashing
//! - [`health`] - liveness/readiness HTTP handlers
//! - [`jitter`] - retry-after jitter sampling
//! - [`limiter`] - the public rate-limiting façade
//! - [`middleware`] - logging, CORS, and rate-limit `axum` middleware
//! - [`policy`] - policy enum and parameters
//! - [`scripts`] - embedded Lua scripts and digest registry
//! - [`server`] - HTTP server setup and routing
//! - [`store`] - the `Store` trait plus its Redis and in-memory implementations

pub mod adapters;
pub mod analytics;
pub mod backoff;
pub mod cli;
pub mod config;
pub mod error;
pub mod hashing;
pub mod health;
pub mod jitter;
pub mod limiter;
pub mod middleware;
pub mod policy;
pub mod scripts;
pub mod server;
pub mod store;

pub use config::FluxConfig;
pub use error::FluxError;
pub use limiter::Limiter;
pub use policy::{Policy, PolicyParams};
pub use store::{MemoryStore, RedisStore, Store};

/// Result type alias for flux operations.
pub type Result<T> = std::result::Result<T, FluxError>;

/// Version of the flux library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
