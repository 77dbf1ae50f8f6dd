use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Names the optional YAML file read by [`Config::load`].
pub const CONFIG_ENV: &str = "SPRINT_CONFIG";

/// Server settings.
///
/// Every field has a default, so a YAML document only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address
    pub host: String,
    pub port: u16,
    /// Worker process count; 1 runs a single in-process worker.
    pub workers: usize,
    /// Verbose error bodies and debug-level logging
    pub debug: bool,
    /// Listen queue depth
    pub backlog: u32,
    /// Seconds a connection may stay idle before `408 Request Timeout`.
    pub request_timeout: u64,
    /// Byte cap per request before `413`; unlimited when absent.
    pub request_max_size: Option<usize>,
    /// Entries kept by the router's resolution cache.
    pub router_cache_size: usize,
    /// Seconds a stopping worker waits for connections to drain.
    pub shutdown_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: 1,
            debug: false,
            backlog: 100,
            request_timeout: 60,
            request_max_size: None,
            router_cache_size: 1024,
            shutdown_timeout: 15,
        }
    }
}

impl Config {
    /// Defaults, then the YAML file named by `SPRINT_CONFIG`, then
    /// `SPRINT_*` environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("in config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("invalid configuration")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(host) = std::env::var("SPRINT_HOST") {
            self.host = host;
        }
        override_from_env("SPRINT_PORT", &mut self.port)?;
        override_from_env("SPRINT_WORKERS", &mut self.workers)?;
        override_from_env("SPRINT_DEBUG", &mut self.debug)?;
        override_from_env("SPRINT_REQUEST_TIMEOUT", &mut self.request_timeout)?;

        let mut max_size = 0usize;
        if override_from_env("SPRINT_REQUEST_MAX_SIZE", &mut max_size)? {
            self.request_max_size = Some(max_size);
        }
        Ok(())
    }
}

fn override_from_env<T>(key: &str, slot: &mut T) -> anyhow::Result<bool>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => {
            *slot = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid value {raw:?} for {key}"))?;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}
