//! `clap`-derived CLI surface for the `flux` binary: operator tooling
//! (`init`, `clear`, `inspect`) layered on top of the same
//! [`crate::config::FluxConfig`] and [`crate::store::Store`] the server uses.
//!
//! `inspect` is the one place a blocking `KEYS` scan is acceptable, since
//! it's an operator-invoked diagnostic, never part of the request hot path.

use crate::config::FluxConfig;
use crate::store::{RedisStore, Store};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flux", about = "Distributed Redis-backed rate limiting engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to a TOML config file (overrides FLUX_CONFIG and ./flux.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a default configuration file.
    Init {
        /// Destination path. Defaults to `flux.toml`.
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Delete every key under the configured prefix.
    Clear,
    /// Report script cache status and live keys under the configured prefix.
    Inspect,
    /// Run the HTTP server (the default when no subcommand is given).
    Serve,
}

const DEFAULT_TOML: &str = r#"[redis]
host = "127.0.0.1"
port = 6379
pool_size = 5
timeout_ms = 1000

[flux]
key_prefix = "flux:"
analytics_enabled = false
analytics_stream = "flux:analytics"
analytics_max_len = 100000
jitter_enabled = false
jitter_max_ms = 0
fail_silently = false

[server]
bind_address = "127.0.0.1:3000"

[rate_limit]
policy = "gcra"
requests = 100
period = 60
"#;

/// Writes the default TOML document to `path`, refusing to clobber an
/// existing file unless `force` is set. Returns the process exit code.
pub fn run_init(path: Option<PathBuf>, force: bool) -> i32 {
    let path = path.unwrap_or_else(|| PathBuf::from("flux.toml"));
    if path.exists() && !force {
        eprintln!("Refusing to overwrite existing file: {} (use --force)", path.display());
        return 1;
    }
    match std::fs::write(&path, DEFAULT_TOML) {
        Ok(()) => {
            println!("Generated configuration file: {}", path.display());
            0
        }
        Err(err) => {
            eprintln!("Failed to write {}: {err}", path.display());
            1
        }
    }
}

/// Connects to the configured store and deletes every key under its prefix.
pub async fn run_clear(config: &FluxConfig) -> i32 {
    let store = match RedisStore::connect(&config.redis_url(), config.redis.pool_size, config.redis.timeout_ms).await
    {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Failed to connect to Redis: {err}");
            return 1;
        }
    };
    match store.scan_delete(&config.flux.key_prefix).await {
        Ok(removed) => {
            println!("Removed {removed} key(s) under prefix '{}'", config.flux.key_prefix);
            0
        }
        Err(err) => {
            eprintln!("Failed to clear keys: {err}");
            1
        }
    }
}

/// Reports script cache status per policy and lists live keys with TTL.
/// Uses a blocking `KEYS` scan — acceptable here since this is a manual,
/// operator-invoked command, never called from request handling.
pub async fn run_inspect(config: &FluxConfig) -> i32 {
    let store = match RedisStore::connect(&config.redis_url(), config.redis.pool_size, config.redis.timeout_ms).await
    {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Failed to connect to Redis: {err}");
            return 1;
        }
    };

    println!("--- Loaded scripts ---");
    match store.script_status().await {
        Ok(statuses) => {
            for (policy, cached) in statuses {
                let status = if cached { "cached" } else { "missing" };
                println!("{:<15} {status}", policy.as_str());
            }
        }
        Err(err) => {
            eprintln!("Failed to check script cache: {err}");
            return 1;
        }
    }

    println!("\n--- Keys (prefix '{}') ---", config.flux.key_prefix);
    match store.keys_with_ttl(&config.flux.key_prefix).await {
        Ok(keys) if keys.is_empty() => println!("No keys found."),
        Ok(keys) => {
            for (key, ttl) in keys {
                println!("  {key:<40} TTL: {ttl}");
            }
        }
        Err(err) => eprintln!("Failed to list keys: {err}"),
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    /// A throwaway path under the system temp dir, unique per call so
    /// parallel test runs don't collide.
    fn scratch_path(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("flux-cli-test-{}-{n}-{name}", std::process::id()))
    }

    #[test]
    fn init_writes_default_toml_to_new_path() {
        let path = scratch_path("init-fresh.toml");
        let code = run_init(Some(path.clone()), false);
        assert_eq!(code, 0);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("jitter_enabled = false"));
        assert!(contents.contains("policy = \"gcra\""));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let path = scratch_path("init-refuse.toml");
        std::fs::write(&path, "pre-existing").unwrap();

        let code = run_init(Some(path.clone()), false);
        assert_eq!(code, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "pre-existing");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn init_overwrites_with_force() {
        let path = scratch_path("init-force.toml");
        std::fs::write(&path, "pre-existing").unwrap();

        let code = run_init(Some(path.clone()), true);
        assert_eq!(code, 0);
        assert!(std::fs::read_to_string(&path).unwrap().contains("[redis]"));

        std::fs::remove_file(&path).ok();
    }
}
