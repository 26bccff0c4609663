//! Layered configuration: built-in defaults, overlaid by a TOML file,
//! overlaid by `FLUX_`-prefixed environment variables.

use crate::error::{FluxError, Result};
use crate::policy::{Policy, PolicyParams};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub pool_size: u32,
    pub timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 6379, pool_size: 5, timeout_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluxSettings {
    pub key_prefix: String,
    pub log_file: Option<PathBuf>,
    pub analytics_enabled: bool,
    pub analytics_stream: String,
    /// Approximate cap (`XADD ... MAXLEN ~ N`) on the raw analytics stream.
    pub analytics_max_len: u64,
    pub jitter_enabled: bool,
    pub jitter_max_ms: u64,
    pub fail_silently: bool,
}

impl Default for FluxSettings {
    fn default() -> Self {
        Self {
            key_prefix: "flux:".to_string(),
            log_file: None,
            analytics_enabled: false,
            analytics_stream: "flux:analytics".to_string(),
            analytics_max_len: 100_000,
            jitter_enabled: false,
            jitter_max_ms: 0,
            fail_silently: false,
        }
    }
}

fn default_rate_limit() -> PolicyParams {
    PolicyParams::new(Policy::Gcra, 100, 60)
}

/// Bind address for the HTTP binary. Not part of the core engine's data
/// model — plain CLI/server glue, split out so it doesn't clutter
/// [`FluxSettings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1:3000".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluxConfig {
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub flux: FluxSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: PolicyParams,
    #[serde(default)]
    pub rate_limits: HashMap<String, PolicyParams>,
}

impl Default for FluxConfig {
    fn default() -> Self {
        Self {
            redis: RedisSettings::default(),
            flux: FluxSettings::default(),
            server: ServerSettings::default(),
            rate_limit: default_rate_limit(),
            rate_limits: HashMap::new(),
        }
    }
}

impl FluxConfig {
    /// Resolves the config file path: explicit `path`, else `FLUX_CONFIG`,
    /// else `./flux.toml` if it exists. None of these being present is not
    /// an error — built-in defaults apply.
    fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = path {
            return Some(p.to_path_buf());
        }
        if let Ok(env_path) = std::env::var("FLUX_CONFIG") {
            return Some(PathBuf::from(env_path));
        }
        let default = PathBuf::from("flux.toml");
        default.exists().then_some(default)
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = Self::resolve_path(path);

        let mut builder = config::Config::builder()
            .add_source(
                config::Config::try_from(&FluxConfig::default())
                    .map_err(|e| FluxError::Config(e.to_string()))?,
            );

        if let Some(p) = &resolved {
            builder = builder.add_source(config::File::from(p.as_path()).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("FLUX").separator("__"))
            .build()
            .map_err(|e| FluxError::Config(e.to_string()))?;

        let cfg: FluxConfig =
            settings.try_deserialize().map_err(|e| FluxError::Config(e.to_string()))?;

        cfg.rate_limit.validate()?;
        for params in cfg.rate_limits.values() {
            params.validate()?;
        }
        Ok(cfg)
    }

    /// Looks up a named preset, falling back to the crate-wide default.
    pub fn params_for(&self, name: &str) -> PolicyParams {
        self.rate_limits.get(name).copied().unwrap_or(self.rate_limit)
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis.host, self.redis.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `FLUX_CONFIG` is process-global state; serialize tests that touch it
    // so they don't race against each other across threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn flux_config_env_var_overrides_search_path() {
        let _guard = ENV_LOCK.lock().unwrap();
        let path = std::env::temp_dir().join(format!("flux-config-test-{}.toml", std::process::id()));
        std::fs::write(&path, "[rate_limit]\npolicy = \"token_bucket\"\nrequests = 7\nperiod = 3\n").unwrap();
        std::env::set_var("FLUX_CONFIG", &path);

        let loaded = FluxConfig::load(None);

        std::env::remove_var("FLUX_CONFIG");
        std::fs::remove_file(&path).ok();

        let cfg = loaded.unwrap();
        assert_eq!(cfg.rate_limit.requests, 7);
        assert_eq!(cfg.rate_limit.policy, Policy::TokenBucket);
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = FluxConfig::default();
        assert_eq!(cfg.rate_limit.requests, 100);
        assert!(!cfg.flux.jitter_enabled);
        assert_eq!(cfg.redis.pool_size, 5);
    }

    #[test]
    fn params_for_falls_back_to_default() {
        let cfg = FluxConfig::default();
        let params = cfg.params_for("nonexistent");
        assert_eq!(params.requests, cfg.rate_limit.requests);
    }

    #[test]
    fn named_preset_overrides_default() {
        let mut cfg = FluxConfig::default();
        cfg.rate_limits.insert(
            "api".to_string(),
            PolicyParams::new(Policy::TokenBucket, 10, 1),
        );
        let params = cfg.params_for("api");
        assert_eq!(params.requests, 10);
        assert_eq!(params.policy, Policy::TokenBucket);
    }
}
